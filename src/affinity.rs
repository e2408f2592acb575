//! Thread-to-core pinning for the sampling thread.
//!
//! Linux uses `sched_setaffinity` through `libc`; on other platforms (or with
//! the `cpu_pinning` feature disabled) pinning is a no-op that reports failure.

use crate::config::PinStrategy;

#[cfg(all(target_os = "linux", feature = "cpu_pinning"))]
mod platform {
    /// Current thread's affinity mask, or `None` if it cannot be read.
    pub fn current_mask() -> Option<libc::cpu_set_t> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            let rc = libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set);
            (rc == 0).then_some(set)
        }
    }

    pub fn current_cpu() -> Option<usize> {
        let cpu = unsafe { libc::sched_getcpu() };
        (cpu >= 0).then_some(cpu as usize)
    }

    pub fn pin(core: usize) -> bool {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(core, &mut set);
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0
        }
    }

    pub fn restore(mask: &libc::cpu_set_t) -> bool {
        unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), mask) == 0 }
    }

    pub type Saved = libc::cpu_set_t;
}

#[cfg(not(all(target_os = "linux", feature = "cpu_pinning")))]
mod platform {
    pub type Saved = ();

    pub fn current_mask() -> Option<Saved> {
        None
    }

    pub fn current_cpu() -> Option<usize> {
        None
    }

    pub fn pin(_core: usize) -> bool {
        false
    }

    pub fn restore(_mask: &Saved) -> bool {
        true
    }
}

/// Pins the current thread to the core it is running on; restores the
/// previous affinity on drop.
pub struct PinGuard {
    saved: Option<platform::Saved>,
    core: Option<usize>,
}

impl PinGuard {
    pub fn pin_current() -> Self {
        let saved = platform::current_mask();
        let core = saved
            .as_ref()
            .and_then(|_| platform::current_cpu())
            .filter(|&core| platform::pin(core));
        if core.is_none() {
            tracing::debug!("CPU pinning unavailable; trials run unpinned");
        }
        Self { saved, core }
    }

    /// Core the thread is pinned to, if pinning succeeded.
    pub fn core(&self) -> Option<usize> {
        self.core
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        if self.core.is_some() {
            if let Some(mask) = &self.saved {
                platform::restore(mask);
            }
        }
    }
}

/// Guard for the whole run when the strategy is [`PinStrategy::Global`].
pub(crate) fn run_guard(strategy: PinStrategy) -> Option<PinGuard> {
    (strategy == PinStrategy::Global).then(PinGuard::pin_current)
}

/// Guard for a single trial when the strategy is [`PinStrategy::PerTrial`].
pub(crate) fn trial_guard(strategy: PinStrategy) -> Option<PinGuard> {
    (strategy == PinStrategy::PerTrial).then(PinGuard::pin_current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_follow_strategy() {
        assert!(run_guard(PinStrategy::None).is_none());
        assert!(trial_guard(PinStrategy::Global).is_none());
        assert!(run_guard(PinStrategy::Global).is_some());
        assert!(trial_guard(PinStrategy::PerTrial).is_some());
    }

    #[test]
    fn test_pin_and_restore() {
        let before = platform::current_mask().is_some();
        {
            let guard = PinGuard::pin_current();
            if guard.core().is_some() {
                assert!(before, "pinning requires a readable mask");
            }
        }
        // Mask is still readable after the guard restored it
        assert_eq!(platform::current_mask().is_some(), before);
    }
}

//! Collector that runs a local executable once per trial.

use super::parse::parse_metrics;
use super::MetricCollector;
use crate::error::{CollectorError, Result, SamplerError};
use crate::metric::{MetricName, ParameterSet, TrialResult, WorkloadId};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Metric name under which the collector reports its own wall-clock measurement.
pub const WALL_TIME_METRIC: &str = "wall_time_s";

/// Poll interval while waiting on a child with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Configuration for [`ProcessCollector`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessCollectorConfig {
    /// Program to execute (resolved through `PATH` when not absolute)
    pub executable: PathBuf,
    /// Working directory for the child (default: inherited)
    pub working_dir: Option<PathBuf>,
    /// Per-trial time budget in seconds; the child is killed when exceeded
    pub timeout_secs: Option<f64>,
    /// Run the workload under `time -v` to collect CPU time and peak RSS
    pub wrap_with_time: bool,
    /// Path of the GNU `time` binary used when `wrap_with_time` is set
    pub time_binary: PathBuf,
}

impl Default for ProcessCollectorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            working_dir: None,
            timeout_secs: None,
            wrap_with_time: false,
            time_binary: PathBuf::from("/usr/bin/time"),
        }
    }
}

impl ProcessCollectorConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(SamplerError::Config("executable must not be empty".into()));
        }
        if let Some(secs) = self.timeout_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(SamplerError::Config(format!(
                    "timeout_secs must be positive, got {}",
                    secs
                )));
            }
        }
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs_f64)
    }
}

/// Runs the configured executable with the parameter set's runtime arguments
/// and parses metrics from stdout and stderr.
///
/// Besides whatever the output contains, every trial reports
/// [`WALL_TIME_METRIC`], measured around the child process.
#[derive(Clone, Debug)]
pub struct ProcessCollector {
    config: ProcessCollectorConfig,
}

impl ProcessCollector {
    pub fn new(config: ProcessCollectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProcessCollectorConfig {
        &self.config
    }

    fn command(&self, params: &ParameterSet) -> Command {
        let mut cmd = if self.config.wrap_with_time {
            let mut c = Command::new(&self.config.time_binary);
            c.arg("-v").arg(&self.config.executable);
            c
        } else {
            Command::new(&self.config.executable)
        };
        cmd.args(&params.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so a timeout can take down everything the workload forked
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl MetricCollector for ProcessCollector {
    fn collect(
        &mut self,
        workload: &WorkloadId,
        params: &ParameterSet,
    ) -> std::result::Result<TrialResult, CollectorError> {
        tracing::debug!(
            "Launching {} ({}) with args [{}]",
            workload,
            self.config.executable.display(),
            params.label()
        );

        let start = Instant::now();
        let mut child = self.command(params).spawn()?;
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match self.config.timeout() {
            Some(limit) => wait_with_timeout(&mut child, limit)?,
            None => child.wait()?,
        };
        let elapsed = start.elapsed();

        let stdout = join_reader(stdout)?;
        let stderr = join_reader(stderr)?;

        if !status.success() {
            return Err(CollectorError::NonZeroExit {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        let mut metrics = parse_metrics(&stdout);
        metrics.extend(parse_metrics(&stderr));
        metrics.insert(MetricName::from(WALL_TIME_METRIC), elapsed.as_secs_f64());
        Ok(metrics)
    }
}

type Reader = Option<JoinHandle<std::io::Result<String>>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Reader {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            pipe.read_to_string(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_reader(reader: Reader) -> std::result::Result<String, CollectorError> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| CollectorError::Other("output reader thread panicked".into()))?
            .map_err(CollectorError::from),
        None => Ok(String::new()),
    }
}

fn wait_with_timeout(
    child: &mut Child,
    limit: Duration,
) -> std::result::Result<ExitStatus, CollectorError> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= limit {
            kill_workload(child);
            child.wait()?;
            return Err(CollectorError::TimedOut(limit));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the child and, on unix, every process in its group.
fn kill_workload(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall; the child is unreaped, so its pid still names its group
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(
                "killpg({}) failed: {}",
                pgid,
                std::io::Error::last_os_error()
            );
        }
    }
    // Already exited between try_wait and kill is fine
    let _ = child.kill();
}

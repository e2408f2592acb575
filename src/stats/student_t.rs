//! Student's t distribution: CDF and two-sided critical values.
//!
//! Computed numerically from the regularized incomplete beta function, so any
//! confidence level and any number of degrees of freedom is supported (no
//! lookup table).

/// Lanczos coefficients (g = 7, n = 9).
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const CF_EPSILON: f64 = 1e-15;
const CF_MAX_ITER: usize = 500;
const TINY: f64 = 1e-300;

/// Natural log of the gamma function for `x > 0`.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x)Γ(1-x) = π / sin(πx)
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = LANCZOS[0];
    let t = x + 7.5;
    for (i, &c) in LANCZOS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=CF_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPSILON {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)` for `x` in `[0, 1]`.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// CDF of Student's t with `df` degrees of freedom.
pub fn cdf(t: f64, df: f64) -> f64 {
    if t.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t == f64::INFINITY {
        return 1.0;
    }
    if t == f64::NEG_INFINITY {
        return 0.0;
    }
    let x = df / (df + t * t);
    let tail = 0.5 * regularized_incomplete_beta(df / 2.0, 0.5, x);
    if t > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Quantile (inverse CDF) for `p` in `[0.5, 1)`.
fn upper_quantile(p: f64, df: f64) -> f64 {
    let mut lo = 0.0;
    let mut hi = 1.0;
    while cdf(hi, df) < p {
        lo = hi;
        hi *= 2.0;
        if hi > 1e12 {
            return f64::INFINITY;
        }
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if cdf(mid, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-12 * hi.max(1.0) {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// Two-sided critical value `t` such that `P(|T| <= t) = confidence` with `df` degrees of freedom.
///
/// Returns infinity when `df == 0` (no finite interval exists) and NaN for a
/// confidence outside `(0, 1)`.
pub fn critical_value(confidence: f64, df: u32) -> f64 {
    if !(confidence > 0.0 && confidence < 1.0) {
        return f64::NAN;
    }
    if df == 0 {
        return f64::INFINITY;
    }
    upper_quantile((1.0 + confidence) / 2.0, df as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_close(actual: f64, expected: f64, tol: f64, msg: &str) {
        let diff = (actual - expected).abs();
        assert!(
            diff < tol,
            "{}: expected {}, got {}, diff = {}",
            msg,
            expected,
            actual,
            diff
        );
    }

    #[test]
    fn test_ln_gamma_known_values() {
        assert_close(ln_gamma(1.0), 0.0, 1e-12, "ln Γ(1)");
        assert_close(ln_gamma(5.0), 24f64.ln(), 1e-12, "ln Γ(5)");
        assert_close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-12, "ln Γ(0.5)");
    }

    #[test]
    fn test_cdf_symmetry() {
        assert_close(cdf(0.0, 4.0), 0.5, 1e-12, "cdf(0)");
        for &t in &[0.3, 1.0, 2.5, 7.0] {
            assert_close(cdf(t, 6.0) + cdf(-t, 6.0), 1.0, 1e-12, "symmetry");
        }
    }

    #[test]
    fn test_cdf_df1_is_cauchy() {
        // With one degree of freedom t is Cauchy: F(t) = 1/2 + atan(t)/π
        for &t in &[-3.0, -0.5, 0.7, 4.0] {
            let expected = 0.5 + f64::atan(t) / std::f64::consts::PI;
            assert_close(cdf(t, 1.0), expected, 1e-10, "cauchy");
        }
    }

    #[test]
    fn test_critical_values_match_tables() {
        assert_close(critical_value(0.95, 1), 12.706_204_7, 1e-4, "95% df=1");
        assert_close(critical_value(0.95, 2), 4.302_652_7, 1e-5, "95% df=2");
        assert_close(critical_value(0.95, 4), 2.776_445_1, 1e-5, "95% df=4");
        assert_close(critical_value(0.95, 10), 2.228_138_9, 1e-5, "95% df=10");
        assert_close(critical_value(0.95, 30), 2.042_272_5, 1e-5, "95% df=30");
        assert_close(critical_value(0.99, 5), 4.032_142_8, 1e-5, "99% df=5");
        assert_close(critical_value(0.90, 9), 1.833_112_9, 1e-5, "90% df=9");
    }

    #[test]
    fn test_critical_value_approaches_normal() {
        assert_close(critical_value(0.95, 100_000), 1.959_985, 1e-3, "large df");
    }

    #[test]
    fn test_critical_value_degenerate_inputs() {
        assert!(critical_value(0.95, 0).is_infinite());
        assert!(critical_value(0.0, 5).is_nan());
        assert!(critical_value(1.0, 5).is_nan());
    }

    proptest! {
        #[test]
        fn prop_critical_value_shrinks_with_df(df in 1u32..200) {
            let narrow = critical_value(0.95, df + 1);
            let wide = critical_value(0.95, df);
            prop_assert!(narrow < wide);
        }

        #[test]
        fn prop_critical_value_grows_with_confidence(df in 1u32..100, c in 0.5f64..0.98) {
            prop_assert!(critical_value(c, df) < critical_value(c + 0.01, df));
        }

        #[test]
        fn prop_cdf_inverts_quantile(df in 1u32..60, c in 0.5f64..0.995) {
            let t = critical_value(c, df);
            let recovered = 2.0 * cdf(t, df as f64) - 1.0;
            prop_assert!((recovered - c).abs() < 1e-8);
        }
    }
}

use crate::error::Error;
use regex::Regex;

/// Mass of a proton, used for ppm deviations
pub const H_MASS: f64 = 1.007276;

/// Round half away from zero to `decimals` places
#[inline]
pub fn round_half_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Render a mass with at most 4 decimals and no trailing zeros, e.g.
/// `15.99491` -> `15.9949`, `57.0` -> `57`
pub fn format_mass(mass: f64) -> String {
    let s = format!("{:.4}", round_half_up(mass, 4));
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".into()
    } else {
        s.into()
    }
}

/// Geometric mean over the finite values of a slice, NaN if there are none
pub fn geometric_mean(slice: &[f64]) -> f64 {
    let values = slice.iter().filter(|v| !v.is_nan()).collect::<Vec<_>>();
    if values.is_empty() {
        return f64::NAN;
    }
    let product = values.iter().fold(1.0f64, |acc, &&x| acc * x);
    product.powf(1.0 / values.len() as f64)
}

/// Treat NaN as an absent value
#[inline]
pub fn finite(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// Compile a pattern that has to match a whole string
pub fn anchored_regex(pattern: &str) -> Result<Regex, Error> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| Error::InvalidRegex {
        pattern: pattern.into(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9 || (a.is_infinite() && b.is_infinite() && a.signum() == b.signum())
}

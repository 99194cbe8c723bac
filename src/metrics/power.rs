//! Pace to power conversion.
//!
//! Ergometers that omit power are approximated with the cubic model
//! `watts = C / (pace / 500)^3`. The constant is an empirical value rather
//! than a device calibration, so it is configurable.

use serde::{Deserialize, Serialize};

/// Default cubic constant.
pub const DEFAULT_WATTS_CONSTANT: f64 = 2.8;

/// Cubic pace/power model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerModel {
    /// Constant `C` in `watts = C / (pace / 500)^3`.
    pub watts_constant: f64,
}

impl Default for PowerModel {
    fn default() -> Self {
        Self {
            watts_constant: DEFAULT_WATTS_CONSTANT,
        }
    }
}

impl PowerModel {
    /// Model with a custom constant.
    #[must_use]
    pub fn new(watts_constant: f64) -> Self {
        Self { watts_constant }
    }

    /// Watts for a pace in seconds per 500m.
    ///
    /// Returns `None` for zero, negative or non-finite paces and whenever the
    /// result would not be finite.
    #[must_use]
    pub fn watts_for_pace(&self, seconds_per_500m: f64) -> Option<f64> {
        if !seconds_per_500m.is_finite() || seconds_per_500m <= 0.0 {
            return None;
        }
        let watts = self.watts_constant / (seconds_per_500m / 500.0).powi(3);
        watts.is_finite().then_some(watts)
    }

    /// [`watts_for_pace`](Self::watts_for_pace) over an optional pace.
    #[must_use]
    pub fn watts_for(&self, seconds_per_500m: Option<f64>) -> Option<f64> {
        seconds_per_500m.and_then(|pace| self.watts_for_pace(pace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_minute_pace() {
        let watts = PowerModel::default().watts_for_pace(120.0).unwrap();
        let expected = 2.8 / (120.0_f64 / 500.0).powi(3);
        assert!((watts - expected).abs() < 1e-9);
        assert!((watts - 202.546).abs() < 1e-3);
    }

    #[test]
    fn zero_and_negative_pace_are_unknown() {
        let model = PowerModel::default();
        assert_eq!(model.watts_for_pace(0.0), None);
        assert_eq!(model.watts_for_pace(-5.0), None);
        assert_eq!(model.watts_for_pace(f64::NAN), None);
        assert_eq!(model.watts_for_pace(f64::INFINITY), None);
    }

    #[test]
    fn vanishing_pace_does_not_overflow_to_infinity() {
        assert_eq!(PowerModel::default().watts_for_pace(1e-300), None);
    }

    #[test]
    fn constant_is_configurable() {
        let model = PowerModel::new(5.6);
        let doubled = model.watts_for_pace(120.0).unwrap();
        let base = PowerModel::default().watts_for_pace(120.0).unwrap();
        assert!((doubled - 2.0 * base).abs() < 1e-9);
    }
}

//! Display helpers for the command line. Unknown values render as `--`.

/// Placeholder for an unknown value.
pub const UNKNOWN: &str = "--";

fn known(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// `"850 m"` below a kilometre, `"1.50 km"` from there on.
#[must_use]
pub fn distance(meters: Option<f64>) -> String {
    match known(meters) {
        Some(m) if m >= 1000.0 => format!("{:.2} km", m / 1000.0),
        Some(m) => format!("{m:.0} m"),
        None => UNKNOWN.to_string(),
    }
}

/// `"mm:ss"`, or `"hh:mm:ss"` from one hour. Rounded, never negative.
#[must_use]
pub fn duration(seconds: Option<f64>) -> String {
    let Some(seconds) = known(seconds) else {
        return UNKNOWN.to_string();
    };
    let total = seconds.round().clamp(0.0, u32::MAX as f64) as u64;
    let (hours, minutes, secs) = (total / 3600, total % 3600 / 60, total % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// `"mm:ss / 500m"`.
#[must_use]
pub fn pace(seconds_per_500m: Option<f64>) -> String {
    match known(seconds_per_500m) {
        Some(_) => format!("{} / 500m", duration(seconds_per_500m)),
        None => UNKNOWN.to_string(),
    }
}

/// `"123 W"`.
#[must_use]
pub fn watts(watts: Option<f64>) -> String {
    match known(watts) {
        Some(w) => format!("{w:.0} W"),
        None => UNKNOWN.to_string(),
    }
}

/// Plain number with `digits` decimals.
#[must_use]
pub fn number(value: Option<f64>, digits: usize) -> String {
    match known(value) {
        Some(v) => format!("{v:.digits$}"),
        None => UNKNOWN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert_eq!(distance(Some(850.4)), "850 m");
        assert_eq!(distance(Some(1500.0)), "1.50 km");
        assert_eq!(distance(Some(1000.0)), "1.00 km");
        assert_eq!(distance(None), "--");
        assert_eq!(distance(Some(f64::NAN)), "--");
    }

    #[test]
    fn durations() {
        assert_eq!(duration(Some(65.4)), "01:05");
        assert_eq!(duration(Some(3723.0)), "01:02:03");
        assert_eq!(duration(Some(-5.0)), "00:00");
        assert_eq!(duration(Some(59.6)), "01:00");
        assert_eq!(duration(None), "--");
    }

    #[test]
    fn paces_and_watts() {
        assert_eq!(pace(Some(120.0)), "02:00 / 500m");
        assert_eq!(pace(None), "--");
        assert_eq!(watts(Some(202.6)), "203 W");
        assert_eq!(watts(None), "--");
        assert_eq!(number(Some(24.26), 1), "24.3");
        assert_eq!(number(Some(24.0), 0), "24");
    }
}

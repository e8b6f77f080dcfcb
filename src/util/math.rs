//! Small numeric helpers shared across the simulation

/// Round to a fixed number of decimal places.
///
/// Coordinates are kept at 2 decimals and angles at 4 so that state diffs
/// don't churn on sub-epsilon float noise.
pub fn round_to(val: f64, precision: i32) -> f64 {
    let multiplier = 10f64.powi(precision);
    (val * multiplier).round() / multiplier
}

/// Round a coordinate (2 decimals)
pub fn round_coord(val: f64) -> f64 {
    round_to(val, 2)
}

/// Round an angle in radians (4 decimals)
pub fn round_angle(val: f64) -> f64 {
    round_to(val, 4)
}

/// Approximate float equality within an epsilon
pub fn floats_equal(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_requested_precision() {
        assert_eq!(round_coord(1.23456), 1.23);
        assert_eq!(round_coord(-1.235), -1.24);
        assert_eq!(round_angle(std::f64::consts::PI), 3.1416);
    }

    #[test]
    fn float_equality_uses_strict_epsilon() {
        assert!(floats_equal(1.0, 1.0049, 0.005));
        assert!(!floats_equal(1.0, 1.005, 0.005));
    }
}

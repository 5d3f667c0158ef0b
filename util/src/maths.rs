//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float
{
    value.max(min).min(max)
}

/// Round a value to the given number of decimal places.
pub fn round_dp<T>(value: T, decimal_places: i32) -> T
where
    T: Float
{
    let scale = T::from(10.0).unwrap_or_else(T::one).powi(decimal_places);
    (value * scale).round() / scale
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(0.9f64, -0.7, 0.7), 0.7);
        assert_eq!(clamp(-0.9f64, -0.7, 0.7), -0.7);
        assert_eq!(clamp(0.1f64, -0.7, 0.7), 0.1);
    }

    #[test]
    fn test_round_dp() {
        assert!((round_dp(0.14f64, 1) - 0.1).abs() < 1e-12);
        assert!((round_dp(-0.16f64, 1) + 0.2).abs() < 1e-12);
        assert!((round_dp(0.7f64, 1) - 0.7).abs() < 1e-12);
    }
}

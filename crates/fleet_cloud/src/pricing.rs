//! Hourly cost per instance class, and the cube size derived from it.

/// Cost used for classes missing from the table. Gives a size of exactly 10.
pub const DEFAULT_HOURLY_COST: f64 = 0.1;

/// Multiplier applied to cost before taking the cube root.
pub const SIZE_FACTOR: f64 = 10_000.0;

/// Class prefixes of the burstable families.
pub const BURSTABLE_PREFIXES: [&str; 4] = ["t2.", "t3.", "t3a.", "t4g."];

/// On-demand hourly cost in dollars.
const PRICES: &[(&str, f64)] = &[
    ("t1.micro", 0.02),
    ("t2.nano", 0.01),
    ("t2.micro", 0.02),
    ("t2.small", 0.04),
    ("t2.medium", 0.08),
    ("m1.small", 0.058),
    ("m1.medium", 0.117),
    ("m3.large", 0.186),
    ("m4.2xlarge", 0.336),
    ("c3.large", 0.132),
    ("c4.large", 0.137),
];

/// Hourly cost of `class`, or [`DEFAULT_HOURLY_COST`] if it is not priced.
#[must_use]
pub fn hourly_cost(class: &str) -> f64 {
    PRICES
        .iter()
        .find(|(name, _)| *name == class)
        .map_or(DEFAULT_HOURLY_COST, |(_, cost)| *cost)
}

/// Edge length of the cube representing an instance of `class`.
#[must_use]
pub fn size(class: &str) -> f32 {
    (hourly_cost(class) * SIZE_FACTOR).cbrt() as f32
}

/// True if `class` belongs to a burstable family.
#[must_use]
pub fn is_burstable(class: &str) -> bool {
    BURSTABLE_PREFIXES
        .iter()
        .any(|prefix| class.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_known_sizes() {
        assert_relative_eq!(size("t2.micro"), 5.848_035, epsilon = 1e-4);
        assert_relative_eq!(size("t2.nano"), 4.641_589, epsilon = 1e-4);
        assert_relative_eq!(size("m4.2xlarge"), 14.977_745, epsilon = 1e-3);
    }

    #[test]
    fn test_unknown_class_defaults() {
        assert_eq!(hourly_cost("x9.gigantic"), DEFAULT_HOURLY_COST);
        assert_relative_eq!(size("x9.gigantic"), 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_size_is_deterministic() {
        assert_eq!(size("c4.large"), size("c4.large"));
    }

    #[test]
    fn test_burstable_families() {
        assert!(is_burstable("t2.micro"));
        assert!(is_burstable("t3a.large"));
        assert!(is_burstable("t4g.nano"));
        assert!(!is_burstable("t1.micro"));
        assert!(!is_burstable("m4.2xlarge"));
        assert!(!is_burstable("t2"));
    }
}

//! Cart line quantities.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A line-item quantity that is never below one.
///
/// Every constructor clamps, so a decrement past one, a stored `0`, or a
/// negative number typed into the quantity box all become `1`. Deserializing
/// goes through the same clamp.
///
/// ```
/// use kiln_core::Quantity;
///
/// assert_eq!(Quantity::clamped(0).get(), 1);
/// assert_eq!(Quantity::clamped(-4).get(), 1);
/// assert_eq!(Quantity::clamped(3).get(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Build a quantity, coercing anything below one up to one.
    #[must_use]
    pub fn clamped(n: i64) -> Self {
        Self(u32::try_from(n.max(1)).unwrap_or(u32::MAX))
    }

    /// The raw count.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// One more unit.
    #[must_use]
    pub const fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// One fewer unit, stopping at one.
    #[must_use]
    pub const fn decrement(self) -> Self {
        if self.0 > 1 { Self(self.0 - 1) } else { Self::ONE }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl From<i64> for Quantity {
    fn from(n: i64) -> Self {
        Self::clamped(n)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_is_one() {
        assert_eq!(Quantity::default(), Quantity::ONE);
    }

    #[test]
    fn test_decrement_stops_at_one() {
        assert_eq!(Quantity::ONE.decrement(), Quantity::ONE);
        assert_eq!(Quantity::clamped(2).decrement(), Quantity::ONE);
    }

    #[test]
    fn test_huge_values_saturate() {
        assert_eq!(Quantity::clamped(i64::MAX).get(), u32::MAX);
        assert_eq!(Quantity::clamped(i64::MAX).increment().get(), u32::MAX);
    }

    #[test]
    fn test_deserialize_clamps() {
        let q: Quantity = serde_json::from_str("0").unwrap();
        assert_eq!(q, Quantity::ONE);
        let q: Quantity = serde_json::from_str("-3").unwrap();
        assert_eq!(q, Quantity::ONE);
        assert_eq!(serde_json::to_string(&Quantity::clamped(4)).unwrap(), "4");
    }

    proptest! {
        #[test]
        fn clamped_is_never_below_one(n in any::<i64>()) {
            prop_assert!(Quantity::clamped(n).get() >= 1);
        }
    }
}

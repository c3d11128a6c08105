//! Catalog listing filters: price buckets, discount bands and sorting.

use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid discount band '{0}', expected e.g. 20-40 or 60-")]
    InvalidDiscountBand(String),
    #[error("invalid price range: min {min} is above max {max}")]
    InvalidPriceRange { min: i64, max: i64 },
    #[error("price {0} is out of range")]
    PriceOutOfRange(i64),
}

/// Whole-percent discount of `price` against `mrp`, 0 when there is none.
pub fn discount_percent(mrp: i64, price: i64) -> i64 {
    if mrp <= 0 || price >= mrp {
        return 0;
    }
    (mrp - price) * 100 / mrp
}

/// Discount range in whole percent. `lower` is inclusive, `upper` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountBand {
    pub lower: i64,
    pub upper: Option<i64>,
}

impl DiscountBand {
    pub fn contains(&self, percent: i64) -> bool {
        percent >= self.lower && self.upper.is_none_or(|upper| percent < upper)
    }

    pub fn matches(&self, mrp: i64, price: i64) -> bool {
        self.contains(discount_percent(mrp, price))
    }
}

impl FromStr for DiscountBand {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FilterError::InvalidDiscountBand(s.to_string());
        let (lower, upper) = s.trim().split_once('-').ok_or_else(invalid)?;

        let lower: i64 = lower.trim().parse().map_err(|_| invalid())?;
        let upper = match upper.trim() {
            "" => None,
            value => Some(value.parse::<i64>().map_err(|_| invalid())?),
        };

        let in_range = |p: i64| (0..=100).contains(&p);
        if !in_range(lower) || upper.is_some_and(|u| !in_range(u) || u <= lower) {
            return Err(invalid());
        }

        Ok(Self { lower, upper })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

/// Price bucket in paise, built from rupee query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl PriceRange {
    pub fn from_rupees(min: Option<i64>, under: Option<i64>) -> Result<Self, FilterError> {
        let to_paise = |rupees: Option<i64>| {
            rupees
                .map(|r| r.checked_mul(100).ok_or(FilterError::PriceOutOfRange(r)))
                .transpose()
        };
        let range = Self {
            min: to_paise(min)?,
            max: to_paise(under)?,
        };
        if let (Some(min), Some(max)) = (range.min, range.max) {
            if min > max {
                return Err(FilterError::InvalidPriceRange { min, max });
            }
        }
        Ok(range)
    }

    pub fn contains(&self, price: i64) -> bool {
        self.min.is_none_or(|min| price >= min) && self.max.is_none_or(|max| price <= max)
    }
}

/// `ILIKE` pattern for a case-insensitive substring search.
pub fn search_pattern(term: &str) -> Option<String> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_discount_percent() {
        assert_eq!(discount_percent(100_000, 70_000), 30);
        assert_eq!(discount_percent(100_000, 100_000), 0);
        assert_eq!(discount_percent(0, 10), 0);
        assert_eq!(discount_percent(99_900, 66_600), 33);
    }

    #[test]
    fn parses_closed_and_open_bands() {
        assert_eq!(
            "20-40".parse::<DiscountBand>().unwrap(),
            DiscountBand {
                lower: 20,
                upper: Some(40)
            }
        );
        assert_eq!(
            "60-".parse::<DiscountBand>().unwrap(),
            DiscountBand {
                lower: 60,
                upper: None
            }
        );
    }

    #[test]
    fn rejects_malformed_bands() {
        for raw in ["", "40", "40-20", "abc-10", "10-200", "-5-10"] {
            assert!(raw.parse::<DiscountBand>().is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn band_upper_bound_is_exclusive() {
        let band: DiscountBand = "20-40".parse().unwrap();
        assert!(band.matches(100_000, 80_000));
        assert!(band.matches(100_000, 61_000));
        assert!(!band.matches(100_000, 60_000));
        assert!(!band.matches(100_000, 81_000));
    }

    #[test]
    fn under_bucket_is_inclusive() {
        let range = PriceRange::from_rupees(None, Some(499)).unwrap();
        assert!(range.contains(49_900));
        assert!(!range.contains(50_000));
    }

    #[test]
    fn rejects_inverted_ranges() {
        assert!(PriceRange::from_rupees(Some(1_000), Some(500)).is_err());
    }

    #[test]
    fn rejects_prices_that_overflow_paise() {
        let huge = i64::MAX / 10;
        assert_eq!(
            PriceRange::from_rupees(None, Some(huge)),
            Err(FilterError::PriceOutOfRange(huge))
        );
        assert_eq!(
            PriceRange::from_rupees(Some(i64::MIN), None),
            Err(FilterError::PriceOutOfRange(i64::MIN))
        );
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(search_pattern("  "), None);
        assert_eq!(search_pattern("kurta").as_deref(), Some("%kurta%"));
        assert_eq!(search_pattern("50%_off").as_deref(), Some("%50\\%\\_off%"));
    }
}

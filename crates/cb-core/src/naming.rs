//! Naming rule for aggregated output columns.
//!
//! The executor names each aggregated column `<source_column>_<function>`.
//! The compiler needs that name to sort on and the adapter needs it to read
//! values back, so both go through [`AggregateKey::new`].

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::spec::Aggregation;

/// Lower edge of a histogram bin in executor output
pub const BIN_START: &str = "bin_start";

/// Upper edge of a histogram bin in executor output
pub const BIN_END: &str = "bin_end";

/// Typed name of an aggregated output column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateKey(String);

impl AggregateKey {
    pub fn new(column: &str, aggregation: Aggregation) -> Self {
        Self(format!("{}_{}", column, aggregation.as_str()))
    }

    /// Key carrying the per-bin frequency of a histogram
    pub fn histogram_count(column: &str) -> Self {
        Self::new(column, Aggregation::Count)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AggregateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AggregateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(AggregateKey::new("sales", Aggregation::Sum).as_str(), "sales_sum");
        assert_eq!(AggregateKey::new("unit_price", Aggregation::Avg).as_str(), "unit_price_avg");
        assert_eq!(AggregateKey::histogram_count("age").as_str(), "age_count");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let key = AggregateKey::new("qty", Aggregation::Max);
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"qty_max\"");
    }
}

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

/// A single key on a time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    Integer(i64),
    DateTime(DateTime<Utc>),
}

impl IndexValue {
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Integer(_) => IndexKind::Integer,
            Self::DateTime(_) => IndexKind::DateTime,
        }
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Integer,
    DateTime,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::DateTime => write!(f, "datetime"),
        }
    }
}

/// Compact, constant-interval description of a time axis.
///
/// Integer indices step by one from `offset`. Datetime indices step by
/// `interval` from `start`. Two indices are equal when kind, origin and
/// interval match, which is what [`IndexCatalog`] deduplicates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeIndex {
    Integer {
        offset: i64,
    },
    DateTime {
        start: DateTime<Utc>,
        #[serde(rename = "interval_ms", with = "interval_millis")]
        interval: TimeDelta,
    },
}

impl Default for TimeIndex {
    fn default() -> Self {
        Self::Integer { offset: 0 }
    }
}

impl TimeIndex {
    pub fn integer(offset: i64) -> Self {
        Self::Integer { offset }
    }

    pub fn datetime(start: DateTime<Utc>, interval: TimeDelta) -> Result<Self> {
        if interval <= TimeDelta::zero() {
            return Err(DispatchError::validation(format!(
                "datetime index interval must be positive, got {interval}"
            )));
        }
        Ok(Self::DateTime { start, interval })
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Integer { .. } => IndexKind::Integer,
            Self::DateTime { .. } => IndexKind::DateTime,
        }
    }

    /// Key of the `position`-th element.
    pub fn at(&self, position: usize) -> IndexValue {
        match *self {
            Self::Integer { offset } => IndexValue::Integer(offset + position as i64),
            Self::DateTime { start, interval } => {
                IndexValue::DateTime(start + interval * position as i32)
            }
        }
    }

    /// Concrete keys for a series of `length` elements.
    pub fn expand(&self, length: usize) -> Vec<IndexValue> {
        (0..length).map(|position| self.at(position)).collect()
    }

    /// Index whose first element is the `position`-th element of this one.
    pub fn slice(&self, position: usize) -> Self {
        match *self {
            Self::Integer { offset } => Self::Integer {
                offset: offset + position as i64,
            },
            Self::DateTime { start, interval } => Self::DateTime {
                start: start + interval * position as i32,
                interval,
            },
        }
    }

    /// Recover the compact index from concrete, ordered keys.
    ///
    /// The kind is taken from the first element. Mixed kinds, a single
    /// timestamp (no interval), non-positive intervals and any deviation from
    /// uniform spacing are rejected.
    pub fn infer(values: &[IndexValue]) -> Result<Self> {
        let first = values
            .first()
            .ok_or_else(|| DispatchError::validation("cannot infer an index from an empty sequence"))?;

        if let Some(position) = values.iter().position(|v| v.kind() != first.kind()) {
            return Err(DispatchError::validation(format!(
                "mixed index kinds: element {position} is {} but the index starts as {}",
                values[position].kind(),
                first.kind()
            )));
        }

        let index = match *first {
            IndexValue::Integer(offset) => Self::Integer { offset },
            IndexValue::DateTime(start) => {
                let second = match values.get(1) {
                    Some(IndexValue::DateTime(second)) => *second,
                    _ => {
                        return Err(DispatchError::validation(
                            "at least two timestamps are needed to infer the interval",
                        ))
                    }
                };
                Self::datetime(start, second - start)?
            }
        };

        if let Some(position) = values
            .iter()
            .enumerate()
            .position(|(position, value)| *value != index.at(position))
        {
            return Err(DispatchError::validation(format!(
                "index is not uniformly spaced: expected {} at position {position}, found {}",
                index.at(position),
                values[position]
            )));
        }

        Ok(index)
    }
}

impl fmt::Display for TimeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer { offset } => write!(f, "integer(offset={offset})"),
            Self::DateTime { start, interval } => {
                write!(f, "datetime(start={}, interval={interval})", start.to_rfc3339())
            }
        }
    }
}

/// Intervals travel as whole milliseconds and must be positive.
mod interval_millis {
    use chrono::TimeDelta;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(interval: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(interval.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        if millis <= 0 {
            return Err(D::Error::custom(format!(
                "datetime index interval must be positive, got {millis} ms"
            )));
        }
        TimeDelta::try_milliseconds(millis).ok_or_else(|| D::Error::custom("interval out of range"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub usize);

/// Store of distinct time indices.
#[derive(Debug, Default)]
pub struct IndexCatalog {
    indices: Vec<TimeIndex>,
    lookup: HashMap<TimeIndex, IndexId>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of an equal index if one is stored, otherwise stores it.
    pub fn intern(&mut self, index: TimeIndex) -> IndexId {
        if let Some(id) = self.lookup.get(&index) {
            return *id;
        }
        let id = IndexId(self.indices.len());
        self.indices.push(index);
        self.lookup.insert(index, id);
        id
    }

    pub fn get(&self, id: IndexId) -> Option<&TimeIndex> {
        self.indices.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn hourly() -> TimeIndex {
        let start = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
        TimeIndex::datetime(start, TimeDelta::hours(1)).unwrap()
    }

    #[test]
    fn test_expand_integer_index() {
        let index = TimeIndex::integer(10);
        let expected: Vec<_> = (10..20).map(IndexValue::Integer).collect();
        assert_eq!(index.expand(10), expected);
    }

    #[test]
    fn test_expand_datetime_index() {
        let index = hourly();
        let values = index.expand(10);
        let start = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(values.len(), 10);
        assert_eq!(values[0], IndexValue::DateTime(start));
        assert_eq!(values[9], IndexValue::DateTime(start + TimeDelta::hours(9)));
    }

    #[test]
    fn test_slice_shifts_origin() {
        assert_eq!(TimeIndex::integer(5).slice(3), TimeIndex::integer(8));

        let sliced = hourly().slice(24);
        assert_eq!(sliced.at(0), hourly().at(24));
        assert_eq!(sliced.expand(3), hourly().expand(27)[24..].to_vec());
    }

    #[test]
    fn test_infer_empty_fails() {
        let err = TimeIndex::infer(&[]).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn test_infer_mixed_kinds_fails() {
        let values = vec![IndexValue::Integer(0), IndexValue::DateTime(Utc::now())];
        let err = TimeIndex::infer(&values).unwrap_err();
        assert!(err.to_string().contains("mixed"), "{err}");
    }

    #[test]
    fn test_infer_non_uniform_fails() {
        let mut values = hourly().expand(5);
        values[3] = hourly().at(7);
        assert!(TimeIndex::infer(&values).is_err());

        let gaps = vec![IndexValue::Integer(0), IndexValue::Integer(2)];
        assert!(TimeIndex::infer(&gaps).is_err());
    }

    #[test]
    fn test_infer_single_timestamp_fails() {
        let values = hourly().expand(1);
        assert!(TimeIndex::infer(&values).is_err());
    }

    #[test]
    fn test_infer_single_integer() {
        assert_eq!(
            TimeIndex::infer(&[IndexValue::Integer(7)]).unwrap(),
            TimeIndex::integer(7)
        );
    }

    #[test]
    fn test_infer_decreasing_timestamps_fails() {
        let mut values = hourly().expand(3);
        values.reverse();
        assert!(TimeIndex::infer(&values).is_err());
    }

    #[test]
    fn test_catalog_deduplicates() {
        let mut catalog = IndexCatalog::new();
        let a = catalog.intern(hourly());
        let b = catalog.intern(TimeIndex::integer(0));
        let c = catalog.intern(hourly());

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(b), Some(&TimeIndex::integer(0)));
    }

    #[test]
    fn test_serde_roundtrip_keeps_equality() {
        let json = serde_json::to_string(&hourly()).unwrap();
        let back: TimeIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hourly());
    }

    #[test]
    fn test_sub_second_interval_survives_serde() {
        let start = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
        let index = TimeIndex::datetime(start, TimeDelta::milliseconds(1500)).unwrap();

        let json = serde_json::to_string(&index).unwrap();
        assert!(json.contains(r#""interval_ms":1500"#), "{json}");
        let back: TimeIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn test_non_positive_serialized_interval_is_rejected() {
        for interval in [0, -3_600_000] {
            let json = format!(
                r#"{{"kind":"date_time","start":"1990-01-01T00:00:00Z","interval_ms":{interval}}}"#
            );
            let err = serde_json::from_str::<TimeIndex>(&json).unwrap_err();
            assert!(err.to_string().contains("must be positive"), "{err}");
        }
    }

    #[test]
    fn test_index_value_untagged_deserialization() {
        let values: Vec<IndexValue> =
            serde_json::from_str(r#"[3, "2020-01-01T00:00:00Z"]"#).unwrap();
        assert_eq!(values[0], IndexValue::Integer(3));
        assert_eq!(values[1].kind(), IndexKind::DateTime);
    }

    proptest! {
        #[test]
        fn prop_integer_roundtrip(offset in -100_000i64..100_000, length in 1usize..500) {
            let index = TimeIndex::integer(offset);
            prop_assert_eq!(TimeIndex::infer(&index.expand(length)).unwrap(), index);
        }

        #[test]
        fn prop_datetime_roundtrip(
            start_secs in 0i64..2_000_000_000,
            interval_secs in 1i64..86_400,
            length in 2usize..500,
        ) {
            let start = Utc.timestamp_opt(start_secs, 0).unwrap();
            let index = TimeIndex::datetime(start, TimeDelta::seconds(interval_secs)).unwrap();
            prop_assert_eq!(TimeIndex::infer(&index.expand(length)).unwrap(), index);
        }
    }
}

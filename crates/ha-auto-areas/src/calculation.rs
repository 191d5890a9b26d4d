//! Reducers combining several sensor readings into one value
//!
//! Every reducer is total: readings of the wrong type are skipped, and an
//! empty input yields `None` ("unknown").

use std::fmt;

use chrono::{DateTime, Utc};
use ha_core::states::{STATE_OFF, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};
use ha_core::State;
use serde::{Deserialize, Serialize};

/// How a derived sensor combines its sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calculation {
    Max,
    Min,
    Mean,
    Median,
    /// Value of the most recently updated source
    Last,
    All,
    One,
    None,
}

impl Calculation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Calculation::Max => "max",
            Calculation::Min => "min",
            Calculation::Mean => "mean",
            Calculation::Median => "median",
            Calculation::Last => "last",
            Calculation::All => "all",
            Calculation::One => "one",
            Calculation::None => "none",
        }
    }

    /// Whether the reducer produces a number from numeric readings
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Calculation::Max
                | Calculation::Min
                | Calculation::Mean
                | Calculation::Median
                | Calculation::Last
        )
    }

    pub fn apply(&self, readings: &[Reading]) -> Option<ReadingValue> {
        match self {
            Calculation::Max => max(readings).map(ReadingValue::Number),
            Calculation::Min => min(readings).map(ReadingValue::Number),
            Calculation::Mean => mean(readings).map(ReadingValue::Number),
            Calculation::Median => median(readings).map(ReadingValue::Number),
            Calculation::Last => last(readings).cloned(),
            Calculation::All => all(readings).map(ReadingValue::Bool),
            Calculation::One => one(readings).map(ReadingValue::Bool),
            Calculation::None => none(readings).map(ReadingValue::Bool),
        }
    }
}

impl fmt::Display for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed state value
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl ReadingValue {
    /// Parse a raw state string. Finite floats become numbers, `on`/`off`
    /// and `true`/`false` become booleans, anything else stays text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(n) = raw.trim().parse::<f64>() {
            if n.is_finite() {
                return ReadingValue::Number(n);
            }
        }
        match raw {
            STATE_ON | "true" => ReadingValue::Bool(true),
            STATE_OFF | "false" => ReadingValue::Bool(false),
            _ => ReadingValue::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ReadingValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ReadingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `unknown` and `unavailable` carry no information
    pub fn is_valid(&self) -> bool {
        !matches!(self, ReadingValue::Text(s) if s == STATE_UNKNOWN || s == STATE_UNAVAILABLE)
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Shortest exact form: 15.0 -> "15", 21.5 -> "21.5"
            ReadingValue::Number(n) => write!(f, "{n}"),
            ReadingValue::Bool(true) => f.write_str(STATE_ON),
            ReadingValue::Bool(false) => f.write_str(STATE_OFF),
            ReadingValue::Text(s) => f.write_str(s),
        }
    }
}

/// One source value as seen by a reducer
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub entity_id: String,
    pub value: ReadingValue,
    pub last_updated: DateTime<Utc>,
}

impl Reading {
    pub fn new(entity_id: impl Into<String>, raw: &str, last_updated: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            value: ReadingValue::parse(raw),
            last_updated,
        }
    }

    pub fn from_state(state: &State) -> Self {
        Self::new(state.entity_id.to_string(), &state.state, state.last_updated)
    }
}

fn numbers(readings: &[Reading]) -> Vec<f64> {
    readings.iter().filter_map(|r| r.value.as_number()).collect()
}

fn bools(readings: &[Reading]) -> Vec<bool> {
    readings.iter().filter_map(|r| r.value.as_bool()).collect()
}

pub fn max(readings: &[Reading]) -> Option<f64> {
    numbers(readings).into_iter().reduce(f64::max)
}

pub fn min(readings: &[Reading]) -> Option<f64> {
    numbers(readings).into_iter().reduce(f64::min)
}

pub fn mean(readings: &[Reading]) -> Option<f64> {
    let values = numbers(readings);
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Middle value; the average of the two middle values for even counts
pub fn median(readings: &[Reading]) -> Option<f64> {
    let mut values = numbers(readings);
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Value of the newest valid reading; equal timestamps resolve to the
/// smallest entity id.
pub fn last(readings: &[Reading]) -> Option<&ReadingValue> {
    readings
        .iter()
        .filter(|r| r.value.is_valid())
        .min_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        })
        .map(|r| &r.value)
}

pub fn all(readings: &[Reading]) -> Option<bool> {
    let values = bools(readings);
    (!values.is_empty()).then(|| values.iter().all(|v| *v))
}

pub fn one(readings: &[Reading]) -> Option<bool> {
    let values = bools(readings);
    (!values.is_empty()).then(|| values.iter().any(|v| *v))
}

pub fn none(readings: &[Reading]) -> Option<bool> {
    let values = bools(readings);
    (!values.is_empty()).then(|| !values.iter().any(|v| *v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn r(entity_id: &str, raw: &str, secs: i64) -> Reading {
        Reading::new(entity_id, raw, at(secs))
    }

    #[test]
    fn test_numeric_reducers() {
        let readings = [r("sensor.a", "10", 0), r("sensor.b", "20", 1), r("sensor.c", "3", 2)];
        assert_eq!(max(&readings), Some(20.0));
        assert_eq!(min(&readings), Some(3.0));
        assert_eq!(mean(&readings), Some(11.0));
        assert_eq!(median(&readings), Some(10.0));
    }

    #[test]
    fn test_mean_of_two() {
        let readings = [r("sensor.a", "10", 0), r("sensor.b", "20", 0)];
        assert_eq!(mean(&readings), Some(15.0));
    }

    #[test]
    fn test_median_even_count_averages_middle() {
        let readings = [
            r("sensor.a", "4", 0),
            r("sensor.b", "1", 0),
            r("sensor.c", "3", 0),
            r("sensor.d", "2", 0),
        ];
        assert_eq!(median(&readings), Some(2.5));
    }

    #[test]
    fn test_empty_and_unparsable_are_unknown() {
        assert_eq!(mean(&[]), None);
        assert_eq!(max(&[]), None);
        let junk = [r("sensor.a", "garbage", 0), r("sensor.b", "unavailable", 0)];
        assert_eq!(median(&junk), None);
        assert_eq!(Calculation::Min.apply(&junk), None);
        assert_eq!(all(&junk), None);
    }

    #[test]
    fn test_unparsable_values_are_skipped() {
        let readings = [r("sensor.a", "12.5", 0), r("sensor.b", "n/a", 0)];
        assert_eq!(max(&readings), Some(12.5));
    }

    #[test]
    fn test_last_picks_newest() {
        let readings = [r("sensor.a", "5", 1), r("sensor.b", "9", 2)];
        assert_eq!(last(&readings), Some(&ReadingValue::Number(9.0)));
    }

    #[test]
    fn test_last_skips_unknown_and_breaks_ties_by_entity_id() {
        let readings = [
            r("sensor.z", "7", 5),
            r("sensor.a", "3", 5),
            r("sensor.new", "unknown", 9),
        ];
        assert_eq!(last(&readings), Some(&ReadingValue::Number(3.0)));
        assert_eq!(last(&[r("sensor.x", "unavailable", 0)]), None);
    }

    #[test]
    fn test_boolean_reducers() {
        let mixed = [r("binary_sensor.a", "on", 0), r("binary_sensor.b", "off", 0)];
        assert_eq!(all(&mixed), Some(false));
        assert_eq!(one(&mixed), Some(true));
        assert_eq!(none(&mixed), Some(false));

        let off = [r("binary_sensor.a", "off", 0), r("binary_sensor.b", "false", 0)];
        assert_eq!(one(&off), Some(false));
        assert_eq!(none(&off), Some(true));
        assert_eq!(all(&[r("binary_sensor.a", "true", 0)]), Some(true));
    }

    #[test]
    fn test_apply_is_deterministic() {
        let readings = [r("sensor.a", "1", 0), r("sensor.b", "2", 0)];
        for calc in [Calculation::Max, Calculation::Median, Calculation::Last] {
            assert_eq!(calc.apply(&readings), calc.apply(&readings));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ReadingValue::Number(15.0).to_string(), "15");
        assert_eq!(ReadingValue::Number(21.3333).to_string(), "21.3333");
        assert_eq!(ReadingValue::Number(64.0 / 3.0).to_string(), "21.333333333333332");
        let huge = ReadingValue::Number(1e300);
        assert_eq!(ReadingValue::parse(&huge.to_string()), huge);
        assert_eq!(ReadingValue::Bool(true).to_string(), "on");
        assert_eq!(Calculation::Median.to_string(), "median");
    }

    #[test]
    fn test_serde_names() {
        let calc: Calculation = serde_yaml::from_str("median").unwrap();
        assert_eq!(calc, Calculation::Median);
        assert!(serde_yaml::from_str::<Calculation>("average").is_err());
    }
}

//! Runtime values moved between a table and a container.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::types::{LogicalType, TemporalKind};
use crate::{Error, ErrorKind, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
// Accepted on read only, databases commonly store datetimes with a space.
const DATETIME_SPACE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATETIME_SPACE_OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

/// A single cell value.
///
/// `Date` and `DateTime` only exist on the relational side: in a container
/// they are always ISO-8601 text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// Text value.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Coerce this value into `logical_type`.
    ///
    /// Temporal values become ISO-8601 text. Fails with
    /// [`ErrorKind::Serialization`] when the value can't represent the type,
    /// e.g. a non numeric string in an integer column.
    pub fn coerce(self, logical_type: LogicalType) -> Result<Value> {
        let coerced = match (logical_type, self) {
            (_, Value::Null) => Some(Value::Null),

            (LogicalType::Integer, Value::Integer(v)) => Some(Value::Integer(v)),
            (LogicalType::Integer, Value::Boolean(v)) => Some(Value::Integer(v as i64)),
            // `i64::MAX as f64` rounds up to 2^63, which is out of range.
            (LogicalType::Integer, Value::Float(v))
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 =>
            {
                Some(Value::Integer(v as i64))
            }
            (LogicalType::Integer, Value::Text(s)) => s.trim().parse().ok().map(Value::Integer),

            (LogicalType::Float, Value::Float(v)) => Some(Value::Float(v)),
            (LogicalType::Float, Value::Integer(v)) => Some(Value::Float(v as f64)),
            (LogicalType::Float, Value::Text(s)) => s.trim().parse().ok().map(Value::Float),

            (LogicalType::Boolean, Value::Boolean(v)) => Some(Value::Boolean(v)),
            (LogicalType::Boolean, Value::Integer(0)) => Some(Value::Boolean(false)),
            (LogicalType::Boolean, Value::Integer(1)) => Some(Value::Boolean(true)),
            (LogicalType::Boolean, Value::Text(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },

            (LogicalType::Text, Value::Text(s)) => Some(Value::Text(s)),
            (LogicalType::Text, Value::Date(d)) => Some(Value::Text(format_date(&d))),
            (LogicalType::Text, Value::DateTime(dt)) => Some(Value::Text(format_datetime(&dt))),
            (LogicalType::Text, other) => Some(Value::Text(other.to_string())),

            (logical_type, other) => {
                return Err(Error::new(
                    ErrorKind::Serialization,
                    format!(
                        "{} value {other} can't be stored as {logical_type}",
                        other.type_name()
                    ),
                ))
            }
        };

        coerced.ok_or_else(|| {
            Error::new(
                ErrorKind::Serialization,
                format!("text value can't be stored as {logical_type}"),
            )
        })
    }

    /// Reparse ISO-8601 text into the temporal value of `kind`.
    ///
    /// Null stays null. A datetime column also accepts a bare date, which is
    /// read as midnight.
    pub fn into_temporal(self, kind: TemporalKind) -> Result<Value> {
        let text = match self {
            Value::Null => return Ok(Value::Null),
            Value::Date(_) | Value::DateTime(_) => return Ok(self),
            Value::Text(s) => s,
            other => {
                return Err(Error::new(
                    ErrorKind::Format,
                    format!("{} value can't be read as {kind:?}", other.type_name()),
                ))
            }
        };

        match kind {
            TemporalKind::Date => parse_date(&text).map(Value::Date),
            TemporalKind::DateTime => parse_datetime(&text)
                .or_else(|_| parse_date(&text).map(|d| d.and_time(NaiveTime::default())))
                .map(Value::DateTime),
        }
        .map_err(|e| e.with_context("value", text))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", format_date(v)),
            Value::DateTime(v) => write!(f, "{}", format_datetime(v)),
        }
    }
}

/// Format a date as ISO-8601.
pub fn format_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Format a datetime as ISO-8601, fractional seconds only when present.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse an ISO-8601 date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| {
        Error::new(ErrorKind::Format, "invalid ISO-8601 date").set_source(e)
    })
}

/// Parse an ISO-8601 datetime, with either `T` or a space as separator.
///
/// A zone designator (`Z`, `+02:00`) is accepted and the result is
/// converted to UTC.
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DATETIME_SPACE_FORMAT))
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.naive_utc()))
        .or_else(|_| {
            DateTime::parse_from_str(s, DATETIME_SPACE_OFFSET_FORMAT).map(|dt| dt.naive_utc())
        })
        .map_err(|e| Error::new(ErrorKind::Format, "invalid ISO-8601 datetime").set_source(e))
}

/// One row of a table, values in schema field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Creates a row.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Values in field order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Value at field position.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    /// Consume into values.
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datetime(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_temporal_values_become_iso_text() {
        let dt = Value::DateTime(datetime("2023-05-20T10:15:00"));
        assert_eq!(
            dt.coerce(LogicalType::Text).unwrap(),
            Value::Text("2023-05-20T10:15:00".to_string())
        );

        let d = Value::Date(NaiveDate::from_ymd_opt(2023, 5, 20).unwrap());
        assert_eq!(
            d.coerce(LogicalType::Text).unwrap(),
            Value::Text("2023-05-20".to_string())
        );
    }

    #[test]
    fn test_fractional_seconds_are_kept() {
        let dt = NaiveDateTime::parse_from_str("2023-05-20T10:15:00.250", "%Y-%m-%dT%H:%M:%S%.f")
            .unwrap();
        let text = format_datetime(&dt);
        assert_eq!(text, "2023-05-20T10:15:00.250");
        assert_eq!(parse_datetime(&text).unwrap(), dt);
    }

    #[test]
    fn test_non_numeric_text_in_integer_column_fails() {
        let err = Value::Text("abc".to_string())
            .coerce(LogicalType::Integer)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);

        let err = Value::Float(1.5).coerce(LogicalType::Integer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_out_of_range_float_in_integer_column_fails() {
        for v in [1e20, -1e20, 9223372036854775808.0, f64::INFINITY, f64::NAN] {
            let err = Value::Float(v).coerce(LogicalType::Integer).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Serialization, "{v}");
        }

        assert_eq!(
            Value::Float(-9223372036854775808.0)
                .coerce(LogicalType::Integer)
                .unwrap(),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn test_zone_suffixed_datetimes_are_utc() {
        assert_eq!(
            parse_datetime("2021-11-07T02:48:42Z").unwrap(),
            datetime("2021-11-07T02:48:42")
        );
        assert_eq!(
            parse_datetime("2021-11-07T02:48:42.5+02:00").unwrap(),
            datetime("2021-11-07T00:48:42.5")
        );
        assert_eq!(
            parse_datetime("2021-11-07 02:48:42-01:00").unwrap(),
            datetime("2021-11-07T03:48:42")
        );
        assert_eq!(
            parse_datetime("2021-11-07 02:48:42Z").unwrap(),
            datetime("2021-11-07T02:48:42")
        );
        assert!(parse_datetime("2021-11-07T02:48:42 Europe/Paris").is_err());
    }

    #[test]
    fn test_lenient_coercions() {
        assert_eq!(
            Value::Text(" 42 ".to_string())
                .coerce(LogicalType::Integer)
                .unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            Value::Integer(3).coerce(LogicalType::Float).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            Value::Integer(1).coerce(LogicalType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            Value::Float(2.5).coerce(LogicalType::Text).unwrap(),
            Value::Text("2.5".to_string())
        );
        assert_eq!(Value::Null.coerce(LogicalType::Integer).unwrap(), Value::Null);
        assert!(Value::Integer(2).coerce(LogicalType::Boolean).is_err());
    }

    #[test]
    fn test_into_temporal() {
        let v = Value::Text("2023-05-20 10:15:00".to_string())
            .into_temporal(TemporalKind::DateTime)
            .unwrap();
        assert_eq!(v, Value::DateTime(datetime("2023-05-20T10:15:00")));

        let v = Value::Text("2023-05-20".to_string())
            .into_temporal(TemporalKind::DateTime)
            .unwrap();
        assert_eq!(v, Value::DateTime(datetime("2023-05-20T00:00:00")));

        assert_eq!(
            Value::Null.into_temporal(TemporalKind::Date).unwrap(),
            Value::Null
        );

        let err = Value::Text("yesterday".to_string())
            .into_temporal(TemporalKind::Date)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}

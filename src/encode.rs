//! Wire encoding for request values.
//!
//! Every value a caller hands to [`ServiceClient::call`](crate::ServiceClient::call) is a
//! [`WireValue`]. Dates, times and decimals are rendered as strings the remote API parses
//! with ECMA-262 date semantics: ISO-8601 with millisecond precision and `Z` for UTC.
//! Everything else is already JSON-native and passes through.
//!
//! Query parameters are encoded one level deep ([`encode_param`]); request bodies are
//! encoded recursively ([`encode_value`], [`encode_json`]).

use std::{collections::BTreeMap, fmt::Write as _};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use thiserror::Error;

const NANOS_PER_SECOND: u32 = 1_000_000_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("JSON can't represent timezone-aware times: {time} carries offset {offset}")]
    TimezoneNotRepresentable { time: NaiveTime, offset: FixedOffset },
    #[error("value is not JSON serializable: {0}")]
    TypeNotSerializable(String),
}

/// A request value, tagged by how it renders on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Date and time of day, with the UTC offset when the source was timezone-aware.
    Timestamp {
        at: NaiveDateTime,
        offset: Option<FixedOffset>,
    },
    Date(NaiveDate),
    /// Bare time of day. Only the naive form is encodable.
    Time {
        at: NaiveTime,
        offset: Option<FixedOffset>,
    },
    Decimal(Decimal),
    List(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
}

impl WireValue {
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<WireValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<WireValue>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn time_with_offset(at: NaiveTime, offset: FixedOffset) -> Self {
        Self::Time {
            at,
            offset: Some(offset),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Timestamp { .. } => "timestamp",
            Self::Date(_) => "date",
            Self::Time { .. } => "time",
            Self::Decimal(_) => "decimal",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for WireValue {
    fn from(value: u32) -> Self {
        Self::UInt(value.into())
    }
}

impl From<u64> for WireValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Decimal> for WireValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<NaiveDate> for WireValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for WireValue {
    fn from(value: NaiveTime) -> Self {
        Self::Time {
            at: value,
            offset: None,
        }
    }
}

impl From<NaiveDateTime> for WireValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp {
            at: value,
            offset: None,
        }
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for WireValue {
    fn from(value: DateTime<Tz>) -> Self {
        let fixed = value.fixed_offset();
        Self::Timestamp {
            at: fixed.naive_local(),
            offset: Some(*fixed.offset()),
        }
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<WireValue>> From<Vec<T>> for WireValue {
    fn from(value: Vec<T>) -> Self {
        Self::list(value)
    }
}

impl From<BTreeMap<String, WireValue>> for WireValue {
    fn from(value: BTreeMap<String, WireValue>) -> Self {
        Self::Map(value)
    }
}

/// JSON-native output of the encoder. Cannot hold dates, times or decimals.
#[derive(Clone, Debug, PartialEq)]
pub enum Encoded {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<Encoded>),
    Map(BTreeMap<String, Encoded>),
}

impl Encoded {
    /// Text form used in a query string.
    fn into_query_text(self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::UInt(value) => Some(value.to_string()),
            Self::Float(value) => Some(float_text(value)),
            Self::String(value) => Some(value),
            Self::List(_) | Self::Map(_) => None,
        }
    }
}

impl Serialize for Encoded {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::UInt(value) => serializer.serialize_u64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value),
            Self::List(items) => serializer.collect_seq(items),
            Self::Map(entries) => serializer.collect_map(entries),
        }
    }
}

/// Query text for a float: always carries a fraction or exponent (`1.0`), and non-finite
/// values render as `nan`, `inf` and `-inf`.
fn float_text(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let text = if value.is_sign_negative() { "-inf" } else { "inf" };
        text.to_string()
    } else {
        format!("{value:?}")
    }
}

/// `YYYY-MM-DDTHH:MM:SS[.fff][Z|±HH:MM]`. Sub-second precision is truncated to
/// milliseconds, never rounded.
pub fn format_timestamp(at: &NaiveDateTime, offset: Option<&FixedOffset>) -> String {
    let mut out = at.format("%Y-%m-%dT%H:%M:%S").to_string();
    push_millis(&mut out, at.nanosecond());
    if let Some(offset) = offset {
        push_offset(&mut out, offset);
    }
    out
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `HH:MM:SS[.fff]`, truncated like [`format_timestamp`].
pub fn format_time(at: &NaiveTime) -> String {
    let mut out = at.format("%H:%M:%S").to_string();
    push_millis(&mut out, at.nanosecond());
    out
}

fn push_millis(out: &mut String, nanos: u32) {
    // leap seconds are carried as nanos >= 1s
    let nanos = nanos % NANOS_PER_SECOND;
    if nanos != 0 {
        let _ = write!(out, ".{:03}", nanos / NANOS_PER_MILLI);
    }
}

fn push_offset(out: &mut String, offset: &FixedOffset) {
    let total = offset.local_minus_utc();
    if total == 0 {
        out.push('Z');
        return;
    }

    let sign = if total < 0 { '-' } else { '+' };
    let total = total.unsigned_abs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let _ = write!(out, "{sign}{hours:02}:{minutes:02}");
    if seconds != 0 {
        let _ = write!(out, ":{seconds:02}");
    }
}

fn encode_leaf(value: &WireValue) -> Result<Encoded, EncodeError> {
    match value {
        WireValue::Null => Ok(Encoded::Null),
        WireValue::Bool(value) => Ok(Encoded::Bool(*value)),
        WireValue::Int(value) => Ok(Encoded::Int(*value)),
        WireValue::UInt(value) => Ok(Encoded::UInt(*value)),
        WireValue::Float(value) if value.is_finite() => Ok(Encoded::Float(*value)),
        WireValue::Float(value) => Err(EncodeError::TypeNotSerializable(format!(
            "non-finite float {value}"
        ))),
        WireValue::String(value) => Ok(Encoded::String(value.clone())),
        WireValue::Timestamp { at, offset } => {
            Ok(Encoded::String(format_timestamp(at, offset.as_ref())))
        }
        WireValue::Date(date) => Ok(Encoded::String(format_date(date))),
        WireValue::Time {
            at,
            offset: Some(offset),
        } => Err(EncodeError::TimezoneNotRepresentable {
            time: *at,
            offset: *offset,
        }),
        WireValue::Time { at, offset: None } => Ok(Encoded::String(format_time(at))),
        WireValue::Decimal(value) => Ok(Encoded::String(value.to_string())),
        WireValue::List(_) | WireValue::Map(_) => Err(EncodeError::TypeNotSerializable(
            format!("nested {} where a scalar was expected", value.kind()),
        )),
    }
}

/// Encode a value and every value nested inside it.
pub fn encode_value(value: &WireValue) -> Result<Encoded, EncodeError> {
    match value {
        WireValue::List(items) => items
            .iter()
            .map(encode_value)
            .collect::<Result<_, _>>()
            .map(Encoded::List),
        WireValue::Map(entries) => entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), encode_value(value)?)))
            .collect::<Result<_, EncodeError>>()
            .map(Encoded::Map),
        leaf => encode_leaf(leaf),
    }
}

/// Encode a query parameter value into the strings sent under its key.
///
/// A scalar yields one string, a list of scalars one string per non-null element (the key
/// is repeated). Null yields nothing. Containers below the first level are rejected.
/// Unlike the body path, non-finite floats are sent as text.
pub fn encode_param(value: &WireValue) -> Result<Vec<String>, EncodeError> {
    let items = match value {
        WireValue::List(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    };

    let mut encoded = Vec::with_capacity(items.len());
    for item in items {
        let text = match item {
            // query strings have no JSON restriction on non-finite floats
            WireValue::Float(value) => Some(float_text(*value)),
            other => encode_leaf(other)?.into_query_text(),
        };
        if let Some(text) = text {
            encoded.push(text);
        }
    }
    Ok(encoded)
}

/// Serialize a request body to a JSON document.
pub fn encode_json(value: &WireValue) -> Result<String, EncodeError> {
    let encoded = encode_value(value)?;
    sonic_rs::to_string(&encoded).map_err(|err| EncodeError::TypeNotSerializable(err.to_string()))
}

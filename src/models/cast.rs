use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Tokens that every column treats as a missing value (compared after trimming).
pub const NULL_TOKENS: [&str; 6] = ["", "-", "NA", "N/A", "null", "NULL"];

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    /// The cell held one of the recognised null tokens.
    NullToken,
    /// The cell held text that does not parse as the target type.
    Unparseable,
    /// The row was shorter than the header.
    Absent,
}

/// Result of casting one raw cell to its target type.
///
/// Casts never fail: malformed input becomes `Missing` with the reason attached,
/// and the caller decides whether the reason is worth counting or logging.
#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome<T> {
    Value(T),
    Missing(MissingReason),
}

impl<T> CastOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CastOutcome::Value(v) => Some(v),
            CastOutcome::Missing(_) => None,
        }
    }

    pub fn as_ref(&self) -> CastOutcome<&T> {
        match self {
            CastOutcome::Value(v) => CastOutcome::Value(v),
            CastOutcome::Missing(r) => CastOutcome::Missing(*r),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CastOutcome::Missing(_))
    }

    /// True when the cell was missing from a short row or could not be interpreted.
    pub fn is_coerced(&self) -> bool {
        matches!(
            self,
            CastOutcome::Missing(MissingReason::Unparseable | MissingReason::Absent)
        )
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CastOutcome<U> {
        match self {
            CastOutcome::Value(v) => CastOutcome::Value(f(v)),
            CastOutcome::Missing(r) => CastOutcome::Missing(r),
        }
    }
}

pub fn is_null_token(raw: &str) -> bool {
    NULL_TOKENS.contains(&raw.trim())
}

/// Shared prelude for every cast: absent fields and null tokens short-circuit.
fn present(raw: Option<&str>) -> CastOutcome<&str> {
    match raw {
        None => CastOutcome::Missing(MissingReason::Absent),
        Some(value) if is_null_token(value) => CastOutcome::Missing(MissingReason::NullToken),
        Some(value) => CastOutcome::Value(value.trim()),
    }
}

pub fn cast_text(raw: Option<&str>) -> CastOutcome<&str> {
    present(raw)
}

pub fn cast_f32(raw: Option<&str>) -> CastOutcome<f32> {
    match present(raw) {
        CastOutcome::Value(value) => match value.parse::<f32>() {
            Ok(v) if v.is_finite() => CastOutcome::Value(v),
            _ => CastOutcome::Missing(MissingReason::Unparseable),
        },
        CastOutcome::Missing(reason) => CastOutcome::Missing(reason),
    }
}

pub fn cast_f64(raw: Option<&str>) -> CastOutcome<f64> {
    match present(raw) {
        CastOutcome::Value(value) => match value.parse::<f64>() {
            Ok(v) if v.is_finite() => CastOutcome::Value(v),
            _ => CastOutcome::Missing(MissingReason::Unparseable),
        },
        CastOutcome::Missing(reason) => CastOutcome::Missing(reason),
    }
}

/// Parse a timestamp written in any of the accepted textual layouts.
///
/// Offsets in RFC 3339 input are dropped and the wall-clock time is kept, matching
/// how the naive layouts are stored.
pub fn parse_timestamp(raw: Option<&str>) -> CastOutcome<NaiveDateTime> {
    let value = match present(raw) {
        CastOutcome::Value(value) => value,
        CastOutcome::Missing(reason) => return CastOutcome::Missing(reason),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return CastOutcome::Value(dt.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return CastOutcome::Value(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return CastOutcome::Value(dt);
            }
        }
    }

    CastOutcome::Missing(MissingReason::Unparseable)
}

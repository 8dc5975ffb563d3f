use crate::sampling::{BackendError, BackendResult};
use derive_more::Display;
use std::cmp::Ordering;

/// The closed set of value kinds a counter field can expose.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// A 32-bit signed integer value
    #[display("int32")]
    Int32,
    /// A 64-bit signed integer value
    #[display("int64")]
    Int64,
    /// A textual value
    #[display("text")]
    Text,
}

/// A single observed value of a counter field.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum FieldValue {
    #[display("{_0}")]
    Int32(i32),
    #[display("{_0}")]
    Int64(i64),
    #[display("{_0}")]
    Text(String),
}

impl FieldValue {
    /// Get the value kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Int32(_) => ValueKind::Int32,
            FieldValue::Int64(_) => ValueKind::Int64,
            FieldValue::Text(_) => ValueKind::Text,
        }
    }

    /// Parse the given wire representation into a value of the requested kind.
    /// Most backends transport 64-bit values as decimal text.
    ///
    /// It returns the parsed value, else the decode error.
    pub fn parse(kind: ValueKind, raw: &str) -> BackendResult<FieldValue> {
        match kind {
            ValueKind::Int32 => raw
                .trim()
                .parse::<i32>()
                .map(FieldValue::Int32)
                .map_err(|e| BackendError::Decode(raw.to_string(), e.to_string())),
            ValueKind::Int64 => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Int64)
                .map_err(|e| BackendError::Decode(raw.to_string(), e.to_string())),
            ValueKind::Text => Ok(FieldValue::Text(raw.to_string())),
        }
    }

    /// Create the representation of a sample count within the given value kind.
    pub(crate) fn of_count(kind: ValueKind, count: u64) -> FieldValue {
        match kind {
            ValueKind::Int32 => FieldValue::Int32(count as i32),
            ValueKind::Int64 => FieldValue::Int64(count as i64),
            ValueKind::Text => FieldValue::Text(count.to_string()),
        }
    }

    /// Create the zero value of the given value kind.
    pub(crate) fn zero(kind: ValueKind) -> FieldValue {
        match kind {
            ValueKind::Int32 => FieldValue::Int32(0),
            ValueKind::Int64 => FieldValue::Int64(0),
            ValueKind::Text => FieldValue::Text(String::new()),
        }
    }
}

impl PartialOrd for FieldValue {
    /// Values of different kinds have no ordering.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int32(a), FieldValue::Int32(b)) => a.partial_cmp(b),
            (FieldValue::Int64(a), FieldValue::Int64(b)) => a.partial_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// The running sum of an instance series under mean aggregation.
/// The accumulator is wide enough to never overflow for any realistic sample stream.
#[derive(Debug, Default, Clone)]
pub(crate) struct ValueSum(i128);

impl ValueSum {
    /// Accumulate the given observation into the sum.
    ///
    /// # Panics
    ///
    /// It panics when the value is textual, text values cannot be summed.
    pub fn accumulate(&mut self, value: &FieldValue) {
        match value {
            FieldValue::Int32(e) => self.0 += *e as i128,
            FieldValue::Int64(e) => self.0 += *e as i128,
            FieldValue::Text(_) => panic!("mean aggregation is not supported for text values"),
        }
    }

    /// Calculate the mean of the accumulated sum over the given sample count.
    /// The division is the integer division of the value kind.
    pub fn mean(&self, count: u64, kind: ValueKind) -> FieldValue {
        let mean = self.0 / count as i128;
        match kind {
            ValueKind::Int32 => FieldValue::Int32(mean as i32),
            ValueKind::Int64 => FieldValue::Int64(mean as i64),
            ValueKind::Text => panic!("mean aggregation is not supported for text values"),
        }
    }

    /// Reset the accumulated sum back to zero.
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

use crate::sampling::{AggregationMode, CounterClass, CounterHandle, ValueKind};
use thiserror::Error;

/// The result type for the sampling package.
pub type Result<T> = std::result::Result<T, SamplingError>;

/// The result type of backend data source operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// The errors reported by a backend data source while refreshing or decoding counter data.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// The requested provider is not known by the backend.
    #[error("provider \"{0}\" is unknown to the backend")]
    UnknownProvider(String),
    /// The requested field is not present in the instance data.
    #[error("field \"{0}\" is not present in the instance data")]
    UnknownField(String),
    /// The backend exposed the field in a value kind the engine does not support.
    #[error("the value kind of field \"{0}\" is not supported")]
    UnsupportedKind(String),
    /// Failed to decode the wire representation of a value.
    #[error("failed to decode \"{0}\", {1}")]
    Decode(String, String),
    /// The underlying instance data is no longer available.
    #[error("the instance data is no longer available")]
    Unavailable,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SamplingError {
    /// The requested counter class is not present in the registry.
    #[error("counter class \"{0}\" is unknown")]
    UnknownClass(String),
    /// The requested field is not a valid field of the counter class.
    #[error("field \"{0}\" is not a valid field of counter class {1}")]
    InvalidField(String, CounterClass),
    /// The aggregation cannot be applied to values of the field's kind.
    #[error("aggregation {0} cannot be applied to {1} values")]
    InvalidAggregation(AggregationMode, ValueKind),
    /// The filter value kind does not match the declared kind of the field.
    #[error("filter value of kind {0} does not match field \"{1}\" of kind {2}")]
    InvalidFilter(ValueKind, String, ValueKind),
    /// The counter has already been registered with the sampler.
    #[error("counter {0} is already registered")]
    DuplicateCounter(CounterHandle),
    /// The counter is not attached to any sampler refresh context.
    #[error("counter {0} is not attached to a sampler")]
    Detached(CounterHandle),
    /// A backend data source error occurred.
    #[error("a backend error occurred, {0}")]
    Backend(BackendError),
}

impl From<BackendError> for SamplingError {
    fn from(error: BackendError) -> Self {
        Self::Backend(error)
    }
}

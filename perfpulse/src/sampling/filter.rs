use crate::sampling::{BackendResult, CounterInstance, FieldValue};
use derive_more::Display;

/// A predicate deciding whether a discovered instance should be tracked by a counter.
/// Filters are immutable once added to a counter.
#[derive(Debug, Display, Clone, PartialEq)]
#[display("{field}={value}")]
pub struct InstanceFilter {
    field: String,
    value: FieldValue,
}

impl InstanceFilter {
    /// Create a new filter for the given field and expected value.
    pub fn new(field: impl Into<String>, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    /// Get the field name this filter applies to.
    pub fn field(&self) -> &str {
        self.field.as_str()
    }

    /// Get the expected value of this filter.
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Check whether the given live instance matches this filter.
    /// An instance on which the field is currently absent never matches.
    ///
    /// # Panics
    ///
    /// It panics when the instance exposes the field in a different value kind than the
    /// filter expects, the engine cannot continue with inconsistent counter data.
    pub fn matches(&self, instance: &dyn CounterInstance) -> BackendResult<bool> {
        match instance.field(self.field.as_str())? {
            None => Ok(false),
            Some(value) => {
                if value.kind() != self.value.kind() {
                    panic!(
                        "filter {} does not match the instance field kind {}",
                        self,
                        value.kind()
                    );
                }

                Ok(value == self.value)
            }
        }
    }
}

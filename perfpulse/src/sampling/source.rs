use crate::sampling::{BackendResult, CounterClass, CounterInstance, RefreshContext};
use derive_more::Display;

/// The instance enumeration capability of a counter class, selected at construction time
/// from the registry. Both variants share the same enumerate contract.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum InstanceSource {
    /// Enumerates zero or more live instances of the provider.
    #[display("multi-instance source of {provider}")]
    Multi { provider: String },
    /// Refreshes the single static instance of the provider.
    #[display("single-instance source of {provider}")]
    Single { provider: String },
}

impl InstanceSource {
    /// Create the instance source matching the capability of the given counter class.
    pub fn from_class(class: CounterClass) -> Self {
        let provider = class.provider().to_string();
        if class.is_single_instance() {
            Self::Single { provider }
        } else {
            Self::Multi { provider }
        }
    }

    /// Get the backend provider name of this source.
    pub fn provider(&self) -> &str {
        match self {
            InstanceSource::Multi { provider } => provider.as_str(),
            InstanceSource::Single { provider } => provider.as_str(),
        }
    }

    /// Enumerate the current live instances through the given refresh context.
    ///
    /// # Panics
    ///
    /// It panics when a single-instance provider enumerates more than one live instance,
    /// the aggregation state can no longer be trusted at that point.
    pub(crate) async fn iterate(
        &self,
        context: &RefreshContext,
    ) -> BackendResult<Vec<Box<dyn CounterInstance>>> {
        match self {
            InstanceSource::Multi { provider } => context.instances(provider.as_str()).await,
            InstanceSource::Single { provider } => {
                let instances = context.instances(provider.as_str()).await?;
                if instances.len() > 1 {
                    panic!(
                        "single-instance provider \"{}\" enumerated {} live instances",
                        provider,
                        instances.len()
                    );
                }

                Ok(instances)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_logger;
    use crate::sampling::{FieldValue, MockTelemetryBackend};
    use crate::testing::TestInstance;
    use std::sync::Arc;

    fn boxed(instances: Vec<TestInstance>) -> Vec<Box<dyn CounterInstance>> {
        instances
            .into_iter()
            .map(|e| Box::new(e) as Box<dyn CounterInstance>)
            .collect()
    }

    #[test]
    fn test_from_class() {
        assert_eq!(
            InstanceSource::Multi {
                provider: "os.processor".to_string()
            },
            InstanceSource::from_class(CounterClass::Processor)
        );
        assert_eq!(
            InstanceSource::Single {
                provider: "os.memory".to_string()
            },
            InstanceSource::from_class(CounterClass::Memory)
        );
    }

    #[tokio::test]
    async fn test_iterate_multi() {
        init_logger!();
        let mut backend = MockTelemetryBackend::new();
        backend.expect_instances().returning(|_| {
            Ok(boxed(vec![
                TestInstance::new().with_field("Name", FieldValue::Text("0".to_string())),
                TestInstance::new().with_field("Name", FieldValue::Text("1".to_string())),
            ]))
        });
        let context = RefreshContext::new(Arc::new(backend));
        let source = InstanceSource::from_class(CounterClass::Processor);

        let result = source.iterate(&context).await.unwrap();

        assert_eq!(2, result.len(), "expected both live instances");
    }

    #[tokio::test]
    #[should_panic]
    async fn test_iterate_single_cardinality_violation() {
        init_logger!();
        let mut backend = MockTelemetryBackend::new();
        backend.expect_instances().returning(|_| {
            Ok(boxed(vec![TestInstance::new(), TestInstance::new()]))
        });
        let context = RefreshContext::new(Arc::new(backend));
        let source = InstanceSource::from_class(CounterClass::Memory);

        let _ = source.iterate(&context).await;
    }
}

use crate::sampling::{BackendResult, FieldValue, Result, SamplingError};
use async_trait::async_trait;
use log::trace;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(feature = "testing")]
use mockall::automock;

/// The instrumentation data source of the engine.
/// A backend refreshes the raw data of all attached counter classes in a single pass and
/// enumerates the live instances of a class on demand.
#[cfg_attr(feature = "testing", automock)]
#[async_trait]
pub trait TelemetryBackend: Debug + Send + Sync {
    /// Refresh the raw data of every attached counter class in one pass.
    async fn refresh(&self) -> BackendResult<()>;

    /// Enumerate the currently live instances of the given provider.
    /// The enumeration may return zero, one or many opaque instance handles.
    async fn instances(&self, provider: &str) -> BackendResult<Vec<Box<dyn CounterInstance>>>;
}

/// One live instance as exposed by a backend enumeration.
/// The handle stays valid until the next backend refresh.
pub trait CounterInstance: Debug + Send + Sync {
    /// Read the given field from the instance data.
    ///
    /// It returns [None] when the field is currently absent for this instance.
    fn field(&self, name: &str) -> BackendResult<Option<FieldValue>>;
}

/// The shared refresh context of a sampler.
/// The context is owned and mutated exclusively by its sampler, counters hold it only as an
/// opaque attach handle through which instances are enumerated.
#[derive(Debug)]
pub struct RefreshContext {
    backend: Arc<dyn TelemetryBackend>,
    attached: RwLock<Vec<String>>,
}

impl RefreshContext {
    pub(crate) fn new(backend: Arc<dyn TelemetryBackend>) -> Self {
        Self {
            backend,
            attached: RwLock::new(Vec::new()),
        }
    }

    /// Get the providers attached to this context, in attach order.
    pub async fn attached(&self) -> Vec<String> {
        self.attached.read().await.clone()
    }

    /// Attach the given provider to the refresh context.
    /// The provider is validated against the backend through a probe enumeration, an unknown
    /// provider leaves the context untouched.
    pub(crate) async fn attach(&self, provider: &str) -> Result<()> {
        trace!("Refresh context is attaching provider \"{}\"", provider);
        self.backend
            .instances(provider)
            .await
            .map_err(SamplingError::Backend)?;

        self.attached.write().await.push(provider.to_string());
        Ok(())
    }

    /// Refresh the raw data of all attached providers in one pass.
    pub(crate) async fn refresh(&self) -> BackendResult<()> {
        self.backend.refresh().await
    }

    /// Enumerate the current live instances of the given provider.
    pub(crate) async fn instances(
        &self,
        provider: &str,
    ) -> BackendResult<Vec<Box<dyn CounterInstance>>> {
        self.backend.instances(provider).await
    }
}

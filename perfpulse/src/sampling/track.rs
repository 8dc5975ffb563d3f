use crate::sampling::{
    AggregationMode, BackendError, CounterClass, CounterInstance, FieldValue, InstanceFilter,
    InstanceSeries, InstanceSource, RefreshContext, Result, SamplingError, ValueKind,
};
use derive_more::Display;
use fx_handle::Handle;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The unique handle of a counter.
pub type CounterHandle = Handle;

/// The lifecycle actions applied to a counter by its owning sampler.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum CounterLifecycle {
    /// Activate sample collection for the counter
    #[display("start")]
    Start,
    /// Deactivate sample collection for the counter
    #[display("stop")]
    Stop,
    /// Enumerate the live instances and ingest one observation per instance
    #[display("update")]
    Update,
    /// Clear every tracked series of the counter in place
    #[display("clear")]
    Clear,
}

/// One user-visible counter, tracking a single field of a counter class across all live
/// instances of that class.
///
/// Counters are created through [Counter::builder], which validates the requested field and
/// aggregation against the class registry. A counter only collects data once it has been
/// registered with a sampler and the sampler has been started.
#[derive(Debug, Display, Clone)]
#[display("{}", inner)]
pub struct Counter {
    inner: Arc<InnerCounter>,
}

impl Counter {
    /// Returns a builder instance for creating a new counter.
    pub fn builder() -> CounterBuilder {
        CounterBuilder::default()
    }

    fn new(class: CounterClass, field: &str, mode: AggregationMode) -> Result<Self> {
        let spec = class
            .field(field)
            .ok_or_else(|| SamplingError::InvalidField(field.to_string(), class))?;
        if mode == AggregationMode::Mean && spec.kind == ValueKind::Text {
            return Err(SamplingError::InvalidAggregation(mode, spec.kind));
        }

        Ok(Self {
            inner: Arc::new(InnerCounter {
                handle: CounterHandle::new(),
                class,
                field: spec.name.to_string(),
                kind: spec.kind,
                mode,
                source: InstanceSource::from_class(class),
                filters: RwLock::new(Vec::new()),
                series: RwLock::new(Vec::new()),
                active: AtomicBool::new(false),
                context: RwLock::new(None),
            }),
        })
    }

    /// Get the unique handle of this counter.
    pub fn handle(&self) -> CounterHandle {
        self.inner.handle
    }

    /// Get the counter class of this counter.
    pub fn class(&self) -> CounterClass {
        self.inner.class
    }

    /// Get the canonical field name sampled by this counter.
    pub fn field(&self) -> &str {
        self.inner.field.as_str()
    }

    /// Get the aggregation mode of this counter.
    pub fn mode(&self) -> AggregationMode {
        self.inner.mode
    }

    /// Check if sample collection is currently active for this counter.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Get the total number of tracked instance series.
    pub async fn total_series(&self) -> usize {
        self.inner.series.read().await.len()
    }

    /// Append an instance filter to this counter.
    /// Once at least one filter is present, only instances matching a filter are tracked.
    ///
    /// # Panics
    ///
    /// It panics when sample collection is active, filters can only be mutated while stopped.
    pub async fn add_filter(&self, field: &str, value: FieldValue) -> Result<()> {
        if self.is_active() {
            panic!(
                "counter {} is active, filters can only be mutated while stopped",
                self
            );
        }

        let spec = self
            .inner
            .class
            .field(field)
            .ok_or_else(|| SamplingError::InvalidField(field.to_string(), self.inner.class))?;
        if spec.kind != value.kind() {
            return Err(SamplingError::InvalidFilter(
                value.kind(),
                spec.name.to_string(),
                spec.kind,
            ));
        }

        let filter = InstanceFilter::new(spec.name, value);
        debug!("Counter {} is adding instance filter {}", self, filter);
        self.inner.filters.write().await.push(filter);
        Ok(())
    }

    /// Get a snapshot of the accumulated values for the given instance identity.
    /// Use [None] to read the series of a single-instance counter class.
    ///
    /// It returns an empty snapshot when no tracked instance matches the identity.
    ///
    /// # Panics
    ///
    /// It panics when sample collection is not active, collection must have been started
    /// before its data can be read.
    pub async fn range(&self, instance: Option<&str>) -> Vec<FieldValue> {
        if !self.is_active() {
            panic!(
                "counter {} is not active, start collection before reading it",
                self
            );
        }

        let series = self.inner.series.read().await;
        series
            .iter()
            .find(|e| e.matches(instance))
            .map(|e| e.values())
            .unwrap_or_default()
    }

    /// Clear every tracked series of this counter in place, preserving the aggregation mode.
    ///
    /// # Panics
    ///
    /// It panics when sample collection is active.
    pub async fn clear(&self) {
        if self.is_active() {
            panic!("counter {} is active, stop collection before clearing it", self);
        }

        let series = self.inner.series.read().await;
        debug!("Counter {} is clearing {} tracked series", self, series.len());
        for series in series.iter() {
            series.clear();
        }
    }

    /// Apply the given lifecycle action to this counter.
    /// The action is driven by the owning sampler.
    pub(crate) async fn apply(&self, action: CounterLifecycle) -> Result<()> {
        trace!("Counter {} is applying lifecycle action {}", self, action);
        match action {
            CounterLifecycle::Start => {
                self.inner.active.store(true, Ordering::Relaxed);
                Ok(())
            }
            CounterLifecycle::Stop => {
                self.inner.active.store(false, Ordering::Relaxed);
                Ok(())
            }
            CounterLifecycle::Update => self.update().await,
            CounterLifecycle::Clear => {
                self.clear().await;
                Ok(())
            }
        }
    }

    /// Attach this counter to the given refresh context of a sampler.
    pub(crate) async fn attach(&self, context: Arc<RefreshContext>) {
        *self.inner.context.write().await = Some(context);
    }

    /// Detach this counter from its sampler refresh context.
    pub(crate) async fn detach(&self) {
        *self.inner.context.write().await = None;
    }

    /// Enumerate the current live instances and ingest one observation per instance.
    async fn update(&self) -> Result<()> {
        let context = self
            .inner
            .context
            .read()
            .await
            .clone()
            .ok_or(SamplingError::Detached(self.handle()))?;

        let instances = self
            .inner
            .source
            .iterate(&context)
            .await
            .map_err(SamplingError::Backend)?;
        trace!("Counter {} enumerated {} live instances", self, instances.len());
        for instance in instances {
            self.ingest(instance.as_ref()).await?;
        }

        Ok(())
    }

    /// Ingest one observation of the given live instance.
    /// The instance is dropped when filters are present and none of them matches; otherwise
    /// its observation is reconciled by instance identity into a new or existing series.
    pub(crate) async fn ingest(&self, instance: &dyn CounterInstance) -> Result<()> {
        // the instance must match at least one filter, if any are present
        {
            let filters = self.inner.filters.read().await;
            if !filters.is_empty() {
                let mut matched = false;
                for filter in filters.iter() {
                    if filter.matches(instance).map_err(SamplingError::Backend)? {
                        matched = true;
                        break;
                    }
                }

                if !matched {
                    trace!("Counter {} dropped a filtered-out instance", self);
                    return Ok(());
                }
            }
        }

        let identity = self.identity_of(instance)?;
        let value = match instance
            .field(self.inner.field.as_str())
            .map_err(SamplingError::Backend)?
        {
            Some(value) => value,
            None => {
                debug!(
                    "Counter {} skipped an instance, field is currently absent",
                    self
                );
                return Ok(());
            }
        };

        let mut series = self.inner.series.write().await;
        match series.iter().find(|e| e.matches(identity.as_deref())) {
            Some(existing) => existing.push(value),
            None => {
                let new_series = InstanceSeries::new(
                    self.inner.mode,
                    self.inner.kind,
                    identity.clone(),
                    self.inner.field.as_str(),
                );
                debug!(
                    "Counter {} is now tracking instance \"{}\"",
                    self,
                    identity.as_deref().unwrap_or("<static>")
                );
                new_series.push(value);
                series.push(new_series);
            }
        }

        Ok(())
    }

    /// Read the identity of the given instance.
    /// Single-instance classes carry no identity.
    fn identity_of(&self, instance: &dyn CounterInstance) -> Result<Option<String>> {
        match self.inner.class.key_field() {
            None => Ok(None),
            Some(key) => match instance.field(key).map_err(SamplingError::Backend)? {
                Some(FieldValue::Text(name)) => Ok(Some(name)),
                Some(value) => panic!(
                    "counter {} expected a text identity for field \"{}\", got {} instead",
                    self,
                    key,
                    value.kind()
                ),
                None => Err(SamplingError::Backend(BackendError::UnknownField(
                    key.to_string(),
                ))),
            },
        }
    }
}

#[derive(Debug, Display)]
#[display("{class}\\{field}")]
struct InnerCounter {
    /// The unique handle of the counter
    handle: CounterHandle,
    /// The counter class being sampled
    class: CounterClass,
    /// The canonical field name being sampled
    field: String,
    /// The value kind of the sampled field
    kind: ValueKind,
    /// The aggregation applied to every instance series
    mode: AggregationMode,
    /// The instance enumeration source of the counter class
    source: InstanceSource,
    /// The ordered instance filters
    filters: RwLock<Vec<InstanceFilter>>,
    /// The tracked series, keyed by instance identity
    series: RwLock<Vec<InstanceSeries>>,
    /// The active state of sample collection
    active: AtomicBool,
    /// The refresh context of the owning sampler
    context: RwLock<Option<Arc<RefreshContext>>>,
}

/// The builder, and only supported construction path, of [Counter] instances.
/// It validates the requested field and aggregation against the class registry.
#[derive(Debug, Default)]
pub struct CounterBuilder {
    class: Option<CounterClass>,
    field: Option<String>,
    mode: Option<AggregationMode>,
}

impl CounterBuilder {
    /// Set the counter class to sample.
    pub fn class(mut self, class: CounterClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Set the field to sample.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Set the aggregation mode, defaults to [AggregationMode::Detailed].
    pub fn mode(mut self, mode: AggregationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Consumes the builder and creates the new counter.
    ///
    /// It returns the created counter, else the validation error.
    pub fn build(self) -> Result<Counter> {
        let class = self.class.expect("expected a counter class to be set");
        let field = self.field.expect("expected a field to be set");
        let mode = self.mode.unwrap_or(AggregationMode::Detailed);

        Counter::new(class, field.as_str(), mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_logger;
    use crate::sampling::MockTelemetryBackend;
    use crate::testing::TestInstance;

    fn processor_instance(name: &str, time: i64) -> TestInstance {
        TestInstance::new()
            .with_field("Name", FieldValue::Text(name.to_string()))
            .with_field("PercentProcessorTime", FieldValue::Int64(time))
    }

    #[test]
    fn test_builder_unknown_field() {
        let result = Counter::builder()
            .class(CounterClass::Memory)
            .field("PercentProcessorTime")
            .build();

        assert_eq!(
            Some(SamplingError::InvalidField(
                "PercentProcessorTime".to_string(),
                CounterClass::Memory
            )),
            result.err(),
            "expected the field to have been rejected"
        );
    }

    #[test]
    fn test_builder_mean_on_text() {
        let result = Counter::builder()
            .class(CounterClass::Process)
            .field("Name")
            .mode(AggregationMode::Mean)
            .build();

        assert_eq!(
            Some(SamplingError::InvalidAggregation(
                AggregationMode::Mean,
                ValueKind::Text
            )),
            result.err(),
            "expected the aggregation to have been rejected"
        );
    }

    #[test]
    fn test_builder_canonical_field_name() {
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("percentPROCESSORtime")
            .build()
            .unwrap();

        assert_eq!(
            "PercentProcessorTime",
            counter.field(),
            "expected the canonical field name"
        );
    }

    #[tokio::test]
    async fn test_add_filter_invalid_kind() {
        init_logger!();
        let counter = Counter::builder()
            .class(CounterClass::NetworkInterface)
            .field("BytesReceivedPerSec")
            .build()
            .unwrap();

        let result = counter
            .add_filter("Status", FieldValue::Text("5".to_string()))
            .await;

        assert_eq!(
            Some(SamplingError::InvalidFilter(
                ValueKind::Text,
                "Status".to_string(),
                ValueKind::Int32
            )),
            result.err(),
            "expected the filter to have been rejected"
        );
    }

    #[tokio::test]
    #[should_panic]
    async fn test_add_filter_while_active_panics() {
        let counter = Counter::builder()
            .class(CounterClass::NetworkInterface)
            .field("BytesReceivedPerSec")
            .build()
            .unwrap();

        counter.apply(CounterLifecycle::Start).await.unwrap();
        let _ = counter.add_filter("Status", FieldValue::Int32(5)).await;
    }

    #[tokio::test]
    async fn test_ingest_reconciles_by_identity() {
        init_logger!();
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("PercentProcessorTime")
            .build()
            .unwrap();

        // the same identity across two refresh cycles accumulates into one series
        counter
            .ingest(&processor_instance("0", 15))
            .await
            .unwrap();
        counter
            .ingest(&processor_instance("0", 45))
            .await
            .unwrap();

        assert_eq!(1, counter.total_series().await, "expected a single series");

        counter.apply(CounterLifecycle::Start).await.unwrap();
        assert_eq!(
            vec![FieldValue::Int64(15), FieldValue::Int64(45)],
            counter.range(Some("0")).await,
            "expected both observations in tick order"
        );
    }

    #[tokio::test]
    async fn test_ingest_filters() {
        init_logger!();
        let counter = Counter::builder()
            .class(CounterClass::NetworkInterface)
            .field("BytesReceivedPerSec")
            .build()
            .unwrap();
        counter
            .add_filter("Status", FieldValue::Int32(5))
            .await
            .unwrap();

        let instances = vec![
            TestInstance::new()
                .with_field("Name", FieldValue::Text("eth0".to_string()))
                .with_field("Status", FieldValue::Int32(5))
                .with_field("BytesReceivedPerSec", FieldValue::Int64(1000)),
            TestInstance::new()
                .with_field("Name", FieldValue::Text("eth1".to_string()))
                .with_field("Status", FieldValue::Int32(5))
                .with_field("BytesReceivedPerSec", FieldValue::Int64(2000)),
            TestInstance::new()
                .with_field("Name", FieldValue::Text("lo".to_string()))
                .with_field("Status", FieldValue::Int32(7))
                .with_field("BytesReceivedPerSec", FieldValue::Int64(3000)),
        ];
        for instance in instances.iter() {
            counter.ingest(instance).await.unwrap();
        }

        assert_eq!(
            2,
            counter.total_series().await,
            "expected only the matching instances to be tracked"
        );
    }

    #[tokio::test]
    async fn test_ingest_filter_absent_field() {
        init_logger!();
        let counter = Counter::builder()
            .class(CounterClass::NetworkInterface)
            .field("BytesReceivedPerSec")
            .build()
            .unwrap();
        counter
            .add_filter("Status", FieldValue::Int32(5))
            .await
            .unwrap();

        // the filtered field is currently absent on the instance
        let instance = TestInstance::new()
            .with_field("Name", FieldValue::Text("tun0".to_string()))
            .with_field("BytesReceivedPerSec", FieldValue::Int64(512));
        counter.ingest(&instance).await.unwrap();

        assert_eq!(
            0,
            counter.total_series().await,
            "expected no match without an error"
        );
    }

    #[tokio::test]
    #[should_panic]
    async fn test_range_while_inactive_panics() {
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("PercentProcessorTime")
            .build()
            .unwrap();

        let _ = counter.range(Some("0")).await;
    }

    #[tokio::test]
    #[should_panic]
    async fn test_range_after_stop_panics() {
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("PercentProcessorTime")
            .build()
            .unwrap();

        counter.apply(CounterLifecycle::Start).await.unwrap();
        counter.apply(CounterLifecycle::Stop).await.unwrap();
        let _ = counter.range(Some("0")).await;
    }

    #[tokio::test]
    async fn test_range_unmatched_instance() {
        init_logger!();
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("PercentProcessorTime")
            .build()
            .unwrap();

        counter.ingest(&processor_instance("0", 10)).await.unwrap();
        counter.apply(CounterLifecycle::Start).await.unwrap();

        let result = counter.range(Some("_Total")).await;

        assert_eq!(
            Vec::<FieldValue>::new(),
            result,
            "expected an empty snapshot for an untracked instance"
        );
    }

    #[tokio::test]
    async fn test_clear() {
        init_logger!();
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("PercentProcessorTime")
            .build()
            .unwrap();

        counter.ingest(&processor_instance("0", 10)).await.unwrap();
        counter.clear().await;
        counter.ingest(&processor_instance("0", 30)).await.unwrap();

        counter.apply(CounterLifecycle::Start).await.unwrap();
        assert_eq!(
            vec![FieldValue::Int64(30)],
            counter.range(Some("0")).await,
            "expected only the observation after the clear"
        );
    }

    #[tokio::test]
    #[should_panic]
    async fn test_clear_while_active_panics() {
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("PercentProcessorTime")
            .build()
            .unwrap();

        counter.apply(CounterLifecycle::Start).await.unwrap();
        counter.clear().await;
    }

    #[tokio::test]
    async fn test_update_detached() {
        init_logger!();
        let counter = Counter::builder()
            .class(CounterClass::Processor)
            .field("PercentProcessorTime")
            .build()
            .unwrap();

        let result = counter.apply(CounterLifecycle::Update).await;

        assert_eq!(
            Some(SamplingError::Detached(counter.handle())),
            result.err(),
            "expected the update to require an attached sampler"
        );
    }

    #[tokio::test]
    async fn test_update_single_instance() {
        init_logger!();
        let mut backend = MockTelemetryBackend::new();
        backend.expect_instances().returning(|_| {
            Ok(vec![Box::new(
                TestInstance::new().with_field("AvailableBytes", FieldValue::Int64(4096)),
            ) as Box<dyn CounterInstance>])
        });
        let context = Arc::new(RefreshContext::new(Arc::new(backend)));
        let counter = Counter::builder()
            .class(CounterClass::Memory)
            .field("AvailableBytes")
            .build()
            .unwrap();
        counter.attach(context).await;

        counter.apply(CounterLifecycle::Update).await.unwrap();
        counter.apply(CounterLifecycle::Update).await.unwrap();

        assert_eq!(
            1,
            counter.total_series().await,
            "expected a single series for a single-instance class"
        );

        counter.apply(CounterLifecycle::Start).await.unwrap();
        assert_eq!(
            vec![FieldValue::Int64(4096), FieldValue::Int64(4096)],
            counter.range(None).await
        );
    }
}

use crate::sampling::{
    Counter, CounterHandle, CounterLifecycle, RefreshContext, Result, SamplingError,
    TelemetryBackend,
};
use derive_more::Display;
use fx_callback::{Callback, MultiThreadedCallback, Subscription};
use fx_handle::Handle;
use log::{debug, error, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

/// The unique handle of a sampler.
pub type SamplerHandle = Handle;

/// The state of a sampler.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum SamplerState {
    /// No counters are registered and no collection is scheduled
    #[display("idle")]
    Idle,
    /// Counters are registered, collection has not been started
    #[display("armed")]
    Armed,
    /// The refresh cycle timer is active and cycles are firing
    #[display("running")]
    Running,
    /// A cancellation of the refresh cycle timer is in flight
    #[display("stopping")]
    Stopping,
}

/// The events emitted by a sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerEvent {
    /// Invoked when a new counter has been registered
    CounterAdded(CounterHandle),
    /// Invoked when sample collection has been started
    Started,
    /// Invoked when a refresh cycle has completed, carrying the completed cycle number
    CycleCompleted(u64),
    /// Invoked when sample collection has been stopped
    Stopped,
}

/// The sampling scheduler, owning zero or more counters and one recurring refresh cycle.
///
/// Each cycle performs one backend-wide refresh and then updates every registered counter in
/// registration order. Cycles are strictly serialized, the next cycle is scheduled only after
/// the previous one has completed.
#[derive(Debug, Display)]
#[display("{}", inner)]
pub struct Sampler {
    inner: Arc<InnerSampler>,
}

impl Sampler {
    /// Create a new sampler on top of the given telemetry backend.
    pub fn new(backend: Arc<dyn TelemetryBackend>) -> Self {
        let context = RefreshContext::new(backend.clone());
        Self {
            inner: Arc::new(InnerSampler {
                handle: SamplerHandle::new(),
                backend,
                context: RwLock::new(Arc::new(context)),
                counters: RwLock::new(Vec::new()),
                state: RwLock::new(SamplerState::Idle),
                cycle: AtomicU64::new(0),
                timer: Mutex::new(None),
                callbacks: MultiThreadedCallback::new(),
            }),
        }
    }

    /// Get the unique handle of this sampler.
    pub fn handle(&self) -> SamplerHandle {
        self.inner.handle
    }

    /// Get the current state of this sampler.
    pub async fn state(&self) -> SamplerState {
        self.inner.state.read().await.clone()
    }

    /// Get the total number of registered counters.
    pub async fn total_counters(&self) -> usize {
        self.inner.counters.read().await.len()
    }

    /// Register the given counter with this sampler.
    /// The counter is attached to the shared refresh context first, a failing attach leaves
    /// the sampler untouched and the counter unregistered.
    ///
    /// # Panics
    ///
    /// It panics when the sampler is currently running, counters can only be registered while
    /// collection is stopped.
    pub async fn add(&self, counter: &Counter) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if *state == SamplerState::Running || *state == SamplerState::Stopping {
            panic!(
                "sampler {} is running, counters can only be added while stopped",
                self
            );
        }

        let mut counters = self.inner.counters.write().await;
        if counters.iter().any(|e| e.handle() == counter.handle()) {
            return Err(SamplingError::DuplicateCounter(counter.handle()));
        }

        // attach to the shared refresh context first, only register the counter on success
        let context = self.inner.context.read().await.clone();
        context.attach(counter.class().provider()).await?;
        counter.attach(context).await;
        counters.push(counter.clone());
        *state = SamplerState::Armed;
        debug!("Sampler {} registered counter {}", self, counter);

        drop(counters);
        drop(state);
        self.inner
            .send_event(SamplerEvent::CounterAdded(counter.handle()));
        Ok(())
    }

    /// Start periodic sample collection with the given refresh interval.
    /// Every registered counter is activated in registration order before the first cycle is
    /// scheduled.
    ///
    /// # Panics
    ///
    /// It panics when the sampler is already running.
    pub async fn start(&self, interval: Duration) {
        let mut state = self.inner.state.write().await;
        if *state == SamplerState::Running {
            panic!("sampler {} is already running", self);
        }

        debug!(
            "Sampler {} is starting sample collection every {}ms",
            self,
            interval.as_millis()
        );
        let counters = self.inner.counters.read().await;
        for counter in counters.iter() {
            if let Err(e) = counter.apply(CounterLifecycle::Start).await {
                error!("Sampler {} failed to start counter {}, {}", self, counter, e);
            }
        }
        drop(counters);

        let token = CancellationToken::new();
        self.inner.store_timer(token.clone());
        *state = SamplerState::Running;
        drop(state);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run(interval, token).await;
        });
        self.inner.send_event(SamplerEvent::Started);
    }

    /// Stop sample collection.
    /// The pending refresh cycle timer is cancelled, a cycle already in progress is not
    /// interrupted; collection has stopped by the next cycle boundary. This operation never
    /// fails and cancelling without a pending timer is a no-op.
    pub async fn stop(&self) {
        let mut state = self.inner.state.write().await;
        let was_running = *state == SamplerState::Running;
        *state = SamplerState::Stopping;
        self.inner.cancel_timer();

        let counters = self.inner.counters.read().await;
        for counter in counters.iter() {
            if let Err(e) = counter.apply(CounterLifecycle::Stop).await {
                error!("Sampler {} failed to stop counter {}, {}", self, counter, e);
            }
        }
        *state = if counters.is_empty() {
            SamplerState::Idle
        } else {
            SamplerState::Armed
        };
        drop(counters);
        drop(state);

        if was_running {
            debug!("Sampler {} has stopped collecting", self);
            self.inner.send_event(SamplerEvent::Stopped);
        }
    }

    /// Drop all registered counters and rebuild the shared refresh context.
    /// The sampler can be reused afterwards as if it was newly created.
    ///
    /// # Panics
    ///
    /// It panics when the sampler is currently running.
    pub async fn reset(&self) {
        let mut state = self.inner.state.write().await;
        if *state == SamplerState::Running {
            panic!(
                "sampler {} is running, reset is only allowed while stopped",
                self
            );
        }

        let mut counters = self.inner.counters.write().await;
        for counter in counters.iter() {
            counter.detach().await;
        }
        counters.clear();
        *self.inner.context.write().await =
            Arc::new(RefreshContext::new(self.inner.backend.clone()));
        *state = SamplerState::Idle;
        debug!("Sampler {} has been reset", self);
    }
}

impl Callback<SamplerEvent> for Sampler {
    fn subscribe(&self) -> Subscription<SamplerEvent> {
        self.inner.callbacks.subscribe()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        trace!("Dropping sampler {}", self.inner);
        self.inner.cancel_timer();
    }
}

#[derive(Debug, Display)]
#[display("{handle}")]
struct InnerSampler {
    /// The unique handle of the sampler
    handle: SamplerHandle,
    /// The telemetry backend the samples are read from
    backend: Arc<dyn TelemetryBackend>,
    /// The shared refresh context, rebuilt on reset
    context: RwLock<Arc<RefreshContext>>,
    /// The registered counters, in registration order
    counters: RwLock<Vec<Counter>>,
    /// The lifecycle state of the sampler
    state: RwLock<SamplerState>,
    /// The number of completed refresh cycles
    cycle: AtomicU64,
    /// The cancellation token of the pending refresh cycle timer
    timer: Mutex<Option<CancellationToken>>,
    callbacks: MultiThreadedCallback<SamplerEvent>,
}

impl InnerSampler {
    /// Run the refresh cycle loop until the timer token is cancelled.
    /// The next cycle is armed only after the previous one has completed, cycles can never
    /// overlap even when a refresh is slow.
    async fn run(&self, interval: Duration, token: CancellationToken) {
        loop {
            select! {
                _ = token.cancelled() => break,
                _ = time::sleep(interval) => self.tick().await,
            }
        }

        debug!("Sampler {} collection loop has stopped", self);
    }

    /// Execute one refresh cycle.
    /// A failing cycle is fatal, a silently degraded sampling stream cannot be told apart
    /// from a correct one by downstream consumers.
    async fn tick(&self) {
        let start_time = Instant::now();

        let context = self.context.read().await.clone();
        if let Err(e) = context.refresh().await {
            error!("Sampler {} failed to refresh the backend data, {}", self, e);
            panic!("refresh cycle failed, {}", e);
        }

        let counters = self.counters.read().await;
        for counter in counters.iter() {
            if let Err(e) = counter.apply(CounterLifecycle::Update).await {
                error!("Sampler {} failed to update counter {}, {}", self, counter, e);
                panic!("refresh cycle failed for counter {}, {}", counter, e);
            }
        }
        drop(counters);

        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let elapsed = start_time.elapsed();
        trace!(
            "Sampler {} completed refresh cycle {} in {}.{:03} seconds",
            self,
            cycle,
            elapsed.as_secs(),
            elapsed.subsec_millis()
        );
        self.send_event(SamplerEvent::CycleCompleted(cycle));
    }

    fn store_timer(&self, token: CancellationToken) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(previous) = timer.take() {
                previous.cancel();
            }
            *timer = Some(token);
        }
    }

    fn cancel_timer(&self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(token) = timer.take() {
                token.cancel();
            }
        }
    }

    fn send_event(&self, event: SamplerEvent) {
        self.callbacks.invoke(event);
    }
}

//! In-memory batching of telemetry events with periodic delivery to an `EventSink`.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time;

use metrics::{counter, gauge};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::CollectorError;
use crate::event::{generate_session_id, generate_user_id, Event, PageContext, Properties};
use crate::identity::{FileIdentityStore, IdentityStore};
use crate::sink::{EventSink, HttpSink, PrintSink};
use crate::time::{SystemTime, TimeSource};

/// The result of a single flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// The batch of this size was delivered and dropped from the queue.
    Sent(usize),
    /// Delivery failed and the batch of this size was put back at the front of the queue.
    Requeued(usize),
}

/// Identity and default properties applied to newly tracked events.
struct State {
    user_id: String,
    default_properties: Properties,
    context: PageContext,
}

struct Inner {
    sink: Arc<dyn EventSink>,
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn TimeSource>,
    session_id: String,
    batch_size: usize,
    state: Mutex<State>,
    queue: Mutex<VecDeque<Event>>,
    /// Held for the whole drain-and-send sequence, so at most one batch is in flight.
    flush_lock: tokio::sync::Mutex<()>,
    /// Set while a threshold-triggered flush is waiting to drain the queue.
    flush_scheduled: AtomicBool,
    runtime: Handle,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Wakes the flush timer between ticks so it can exit without interrupting a flush.
    stop_timer: Arc<Notify>,
}

/// A batch drained from the queue for delivery. Unless marked delivered, it is put back at the
/// front of the queue when dropped, which also covers a flush future dropped mid-send.
struct InFlightBatch<'a> {
    queue: &'a Mutex<VecDeque<Event>>,
    events: Vec<Event>,
    delivered: bool,
}

impl InFlightBatch<'_> {
    /// Put the batch back in front of anything tracked meanwhile, returning the new queue depth.
    fn requeue(&mut self) -> usize {
        let mut queue = lock(self.queue);
        for event in self.events.drain(..).rev() {
            queue.push_front(event);
        }
        queue.len()
    }
}

impl Drop for InFlightBatch<'_> {
    fn drop(&mut self) {
        if self.delivered || self.events.is_empty() {
            return;
        }

        let size = self.events.len();
        let depth = self.requeue();
        counter!("collector_events_requeued_total").increment(size as u64);
        gauge!("collector_queue_depth").set(depth as f64);
        warn!(size, depth, "flush interrupted, batch requeued");
    }
}

/// A cloneable handle to a running event collector.
///
/// Events are queued by `track` and delivered in batches by `flush`, which runs on a fixed
/// interval, whenever the queue reaches the batch size, or when called directly. A failed
/// delivery puts the batch back at the front of the queue, so events are only dropped once
/// they have been delivered.
///
/// The collector must be created inside a tokio runtime. The flush timer stops once every
/// handle has been dropped, or on `shutdown`.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Collector {
    /// Build a collector from configuration: events go to the ingestion endpoint when an api key
    /// is configured and are logged otherwise, and the user id is persisted at `identity_path`.
    pub fn from_config(config: &Config) -> Result<Self, CollectorError> {
        let sink: Arc<dyn EventSink> = match &config.api_key {
            Some(api_key) => Arc::new(HttpSink::new(
                &config.api_url,
                api_key,
                config.request_timeout.0,
            )?),
            None => {
                warn!("no api key configured, events will only be logged");
                Arc::new(PrintSink {})
            }
        };
        let store = Arc::new(FileIdentityStore::new(config.identity_path.clone()));

        Self::new(config, sink, store)
    }

    pub fn new(
        config: &Config,
        sink: Arc<dyn EventSink>,
        store: Arc<dyn IdentityStore>,
    ) -> Result<Self, CollectorError> {
        Self::with_time_source(config, sink, store, Arc::new(SystemTime {}))
    }

    pub fn with_time_source(
        config: &Config,
        sink: Arc<dyn EventSink>,
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, CollectorError> {
        let runtime = Handle::try_current()?;
        let user_id = resolve_user_id(config, store.as_ref());
        let session_id = generate_session_id();

        info!(%user_id, %session_id, "starting event collector");

        let inner = Arc::new(Inner {
            sink,
            store,
            clock,
            session_id,
            batch_size: config.batch_size.max(1),
            state: Mutex::new(State {
                user_id,
                default_properties: config.metadata.0.clone(),
                context: PageContext::default(),
            }),
            queue: Mutex::new(VecDeque::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            flush_scheduled: AtomicBool::new(false),
            runtime,
            timer: Mutex::new(None),
            stop_timer: Arc::new(Notify::new()),
        });

        let period = config.flush_interval.0;
        if period.is_zero() {
            warn!("flush interval is zero, automatic flushing is disabled");
        } else {
            let timer = spawn_flush_timer(
                Arc::downgrade(&inner),
                inner.stop_timer.clone(),
                period,
                &inner.runtime,
            );
            *lock(&inner.timer) = Some(timer);
        }

        Ok(Self { inner })
    }

    /// Queue a new event and return it. Never waits on the network: reaching the batch size
    /// schedules a flush in the background.
    ///
    /// A failed delivery leaves its batch queued, so while the endpoint is down the queue stays at
    /// or above the batch size and every call schedules another attempt. Attempts never overlap,
    /// which bounds the retry rate to one request in flight at a time.
    pub fn track(&self, name: impl Into<String>, properties: Properties) -> Event {
        let event = {
            let state = lock(&self.inner.state);
            let mut merged = state.default_properties.clone();
            merged.extend(state.context.properties());
            merged.extend(properties);

            Event {
                name: name.into(),
                user_id: state.user_id.clone(),
                session_id: self.inner.session_id.clone(),
                timestamp: self.inner.clock.current_time_ms(),
                properties: merged,
            }
        };

        let depth = {
            let mut queue = lock(&self.inner.queue);
            queue.push_back(event.clone());
            queue.len()
        };

        counter!("collector_events_tracked_total").increment(1);
        gauge!("collector_queue_depth").set(depth as f64);
        debug!(event = %event.name, depth, "tracked event");

        if depth >= self.inner.batch_size {
            self.schedule_flush();
        }

        event
    }

    /// Record a transport or application error as an `error` event.
    pub fn track_error(&self, kind: &str, message: &str, properties: Properties) -> Event {
        let mut merged = properties;
        merged.insert("error_type".to_owned(), Value::String(kind.to_owned()));
        merged.insert("error_message".to_owned(), Value::String(message.to_owned()));

        self.track("error", merged)
    }

    /// Send everything currently queued as one batch.
    ///
    /// Waits for any flush already in flight to finish first. Events tracked while the
    /// request is pending are not part of the batch. On failure the batch is put back in
    /// front of them, in its original order.
    pub async fn flush(&self) -> FlushOutcome {
        let _in_flight = self.inner.flush_lock.lock().await;

        self.inner.flush_scheduled.store(false, Ordering::Release);
        let mut batch = InFlightBatch {
            queue: &self.inner.queue,
            events: lock(&self.inner.queue).drain(..).collect(),
            delivered: false,
        };
        if batch.events.is_empty() {
            return FlushOutcome::Empty;
        }
        gauge!("collector_queue_depth").set(0.0);

        let size = batch.events.len();
        let result = self.inner.sink.send_batch(&batch.events).await;
        match result {
            Ok(()) => {
                batch.delivered = true;
                counter!("collector_flush_total", "outcome" => "sent").increment(1);
                debug!(size, "flushed events");

                FlushOutcome::Sent(size)
            }
            Err(error) => {
                let depth = batch.requeue();

                counter!("collector_flush_total", "outcome" => "requeued").increment(1);
                counter!("collector_events_requeued_total").increment(size as u64);
                gauge!("collector_queue_depth").set(depth as f64);
                warn!(size, depth, "failed to flush events, batch requeued: {}", error);

                FlushOutcome::Requeued(size)
            }
        }
    }

    /// Switch to a new user id, merging `traits` into the properties of every later event.
    /// The user id is persisted so that later sessions start out identified.
    pub fn identify(&self, user_id: impl Into<String>, traits: Properties) {
        let user_id = user_id.into();
        {
            let mut state = lock(&self.inner.state);
            state.user_id = user_id.clone();
            state.default_properties.extend(traits);
        }

        if let Err(error) = self.inner.store.store(&user_id) {
            warn!("failed to persist user id: {}", error);
        }
        info!(%user_id, "identified user");
    }

    pub fn set_context(&self, context: PageContext) {
        lock(&self.inner.state).context = context;
    }

    /// Stop the flush timer and make a final delivery attempt. A timer flush already in flight
    /// is allowed to finish first.
    pub async fn shutdown(&self) -> FlushOutcome {
        let timer = lock(&self.inner.timer).take();
        if let Some(timer) = timer {
            self.inner.stop_timer.notify_one();
            if let Err(error) = timer.await {
                warn!("flush timer failed: {}", error);
            }
        }

        let outcome = self.flush().await;
        info!(?outcome, remaining = self.queue_len(), "event collector stopped");

        outcome
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// A snapshot of the queued events, oldest first.
    pub fn queued(&self) -> Vec<Event> {
        lock(&self.inner.queue).iter().cloned().collect()
    }

    pub fn user_id(&self) -> String {
        lock(&self.inner.state).user_id.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    fn schedule_flush(&self) {
        if self.inner.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let collector = self.clone();
        self.inner.runtime.spawn(async move {
            collector.flush().await;
        });
    }
}

fn resolve_user_id(config: &Config, store: &dyn IdentityStore) -> String {
    if let Some(user_id) = &config.user_id {
        return user_id.clone();
    }

    match store.load() {
        Ok(Some(user_id)) => return user_id,
        Ok(None) => {}
        Err(error) => warn!("failed to load persisted user id: {}", error),
    }

    let user_id = generate_user_id();
    if let Err(error) = store.store(&user_id) {
        warn!("failed to persist user id: {}", error);
    }

    user_id
}

/// Flush on a fixed period until the collector is dropped or `stop` is notified. The first flush
/// happens one period after start. A stop request is only observed between flushes.
fn spawn_flush_timer(
    inner: Weak<Inner>,
    stop: Arc<Notify>,
    period: time::Duration,
    runtime: &Handle,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.notified() => {
                    debug!("flush timer stopped");
                    break;
                }
                _ = interval.tick() => {}
            }

            let Some(inner) = inner.upgrade() else {
                debug!("event collector dropped, stopping flush timer");
                break;
            };
            Collector { inner }.flush().await;
        }
    })
}

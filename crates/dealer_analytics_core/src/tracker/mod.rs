//! crates/dealer_analytics_core/src/tracker/mod.rs
//!
//! The event buffer: accumulates tracking events, mirrors them into local
//! storage, batches them to the collector and retries failed deliveries.
//!
//! Production (`track`) never waits on delivery. Flushes run as spawned tasks,
//! retries go through a bounded channel to the scheduler in [`retry`], and the
//! queue itself sits behind a mutex that is never held across an `.await`.

mod retry;

use crate::domain::{
    AnalyticsEvent, CollectorPayload, ConsentSettings, EventKey, EventPayload, EventType,
    PageContext,
};
use crate::ports::{CollectorTransport, KeyValueStore, PortError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use retry::RetryRequest;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const QUEUE_STORAGE_KEY: &str = "epic_queue_v2";

const SCROLL_MILESTONES: [u8; 5] = [25, 50, 75, 90, 100];
const MAX_STACK_CHARS: usize = 1000;

//=========================================================================================
// Configuration and Reporting Types
//=========================================================================================

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Queue length that triggers a flush on its own.
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Delivery attempts after the first one before an event is dropped.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each following one.
    pub backoff_base: Duration,
    /// Capacity of the channel feeding the retry scheduler.
    pub retry_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            retry_capacity: 256,
        }
    }
}

impl TrackerConfig {
    pub fn backoff_for(&self, retries: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retries)
    }

    /// How long a visitor revocation is remembered. Covers the whole backoff
    /// ladder plus a request still on the wire when the visitor opted out.
    fn revocation_memory(&self) -> chrono::Duration {
        let ladder: Duration = (0..self.max_retries).map(|n| self.backoff_for(n)).sum();
        chrono::Duration::from_std(ladder + Duration::from_secs(300))
            .unwrap_or_else(|_| chrono::Duration::hours(1))
    }
}

/// Who and where a single request's events belong to, for trackers shared by
/// many visitors. See [`Tracker::scoped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventScope {
    pub client_id: Uuid,
    pub session_id: Uuid,
    pub page: PageContext,
    /// The visitor's scroll high-water mark before this request.
    pub scroll_depth: u8,
    /// Milliseconds the visitor has spent on the page, as reported by the page.
    pub time_on_page: u64,
}

/// Who the tracked events belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerIdentity {
    pub client_id: Uuid,
    pub session_id: Uuid,
}

/// What a single flush did with the batch it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// No collector is configured; the batch was cleared.
    Disabled,
    Delivered(usize),
    /// The collector answered 404; the batch was discarded without retry.
    Discarded(usize),
    RetryScheduled { retrying: usize, dropped: usize },
}

/// What `track` did with a new event.
#[derive(Debug)]
pub enum TrackOutcome {
    /// No collector is configured, nothing was recorded.
    Disabled,
    Queued,
    /// The event was queued and a flush was started for it.
    Flushing(JoinHandle<FlushOutcome>),
}

/// Running totals, so that dropped events are visible to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub delivered: u64,
    pub retried: u64,
    /// Discarded because the collector answered 404.
    pub discarded: u64,
    /// Dropped after exhausting retries, a full retry queue, or revoked consent.
    pub dropped: u64,
    /// Handed to the beacon transport with unknown outcome.
    pub beaconed: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    retried: AtomicU64,
    discarded: AtomicU64,
    dropped: AtomicU64,
    beaconed: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

//=========================================================================================
// The Tracker
//=========================================================================================

struct TrackerState {
    queue: VecDeque<AnalyticsEvent>,
    consent: ConsentSettings,
    /// Bumped on every analytics revocation; retries from an older epoch are dropped.
    consent_epoch: u64,
    page: PageContext,
    retry_counts: HashMap<EventKey, u32>,
    scroll_depth: u8,
    /// Visitors who opted out, with the moment they did. Their older events
    /// are dropped instead of retried.
    revoked_visitors: HashMap<Uuid, DateTime<Utc>>,
}

impl TrackerState {
    fn is_revoked(&self, event: &AnalyticsEvent) -> bool {
        event_visitor(event)
            .and_then(|visitor| self.revoked_visitors.get(&visitor))
            .is_some_and(|revoked_at| event.timestamp <= *revoked_at)
    }
}

/// The visitor an event was recorded for: an explicit `visitor_id` in the
/// payload, else the event's client id.
fn event_visitor(event: &AnalyticsEvent) -> Option<Uuid> {
    match event.payload.get("visitor_id").and_then(Value::as_str) {
        Some(raw) => Uuid::parse_str(raw).ok(),
        None => Some(event.client_id),
    }
}

pub(crate) struct TrackerInner {
    identity: TrackerIdentity,
    config: TrackerConfig,
    store: Arc<dyn KeyValueStore>,
    transport: Option<Arc<dyn CollectorTransport>>,
    state: Mutex<TrackerState>,
    retries: Option<mpsc::Sender<RetryRequest>>,
    counters: Counters,
    started: Instant,
    shutdown: CancellationToken,
}

/// A cheaply cloneable handle to one event buffer.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
    scope: Option<Arc<EventScope>>,
}

impl Tracker {
    /// Creates the tracker and, when a collector is configured, restores the
    /// queue from storage and starts the auto-flush and retry tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        identity: TrackerIdentity,
        consent: ConsentSettings,
        store: Arc<dyn KeyValueStore>,
        transport: Option<Arc<dyn CollectorTransport>>,
        config: TrackerConfig,
    ) -> Self {
        let queue = if transport.is_some() {
            load_queue(store.as_ref())
        } else {
            // Events buffered while a collector was configured have nowhere to go now.
            if let Err(e) = store.remove_item(QUEUE_STORAGE_KEY) {
                debug!("Failed to clear stored event queue: {}", e);
            }
            VecDeque::new()
        };

        let (retry_tx, retry_rx) = match transport {
            Some(_) => {
                let (tx, rx) = mpsc::channel(config.retry_capacity.max(1));
                (Some(tx), Some(rx))
            }
            None => (None, None),
        };

        let shutdown = CancellationToken::new();
        let flush_interval = config.flush_interval;
        let inner = Arc::new(TrackerInner {
            identity,
            config,
            store,
            transport,
            state: Mutex::new(TrackerState {
                queue,
                consent: consent.normalized(),
                consent_epoch: 0,
                page: PageContext::default(),
                retry_counts: HashMap::new(),
                scroll_depth: 0,
                revoked_visitors: HashMap::new(),
            }),
            retries: retry_tx,
            counters: Counters::default(),
            started: Instant::now(),
            shutdown: shutdown.clone(),
        });

        if let Some(retry_rx) = retry_rx {
            tokio::spawn(retry::run_scheduler(
                Arc::downgrade(&inner),
                retry_rx,
                shutdown.clone(),
            ));
            tokio::spawn(run_auto_flush(
                Arc::downgrade(&inner),
                flush_interval,
                shutdown,
            ));
            info!(
                "Analytics tracker started for client {} (session {}).",
                identity.client_id, identity.session_id
            );
        } else {
            info!("No collector endpoint configured; analytics tracking is disabled.");
        }

        Tracker { inner, scope: None }
    }

    /// A handle onto the same buffer whose events carry `scope`'s visitor,
    /// session and page instead of the tracker's own. Meant for one request.
    pub fn scoped(&self, scope: EventScope) -> Tracker {
        Tracker {
            inner: Arc::clone(&self.inner),
            scope: Some(Arc::new(scope)),
        }
    }

    pub fn identity(&self) -> TrackerIdentity {
        self.inner.identity
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.transport.is_some()
    }

    /// Sets the page subsequent events are attributed to.
    pub fn set_page(&self, page: PageContext) {
        self.inner.state().page = page;
    }

    pub fn consent(&self) -> ConsentSettings {
        self.inner.state().consent
    }

    pub fn pending(&self) -> usize {
        self.inner.state().queue.len()
    }

    pub fn stats(&self) -> TrackerStats {
        let counters = &self.inner.counters;
        TrackerStats {
            delivered: counters.delivered.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            beaconed: counters.beaconed.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    /// Records an event. High-priority events, and the event that fills a
    /// batch, start a flush immediately.
    pub fn track(
        &self,
        event_type: impl Into<EventType>,
        event_name: Option<&str>,
        payload: EventPayload,
    ) -> TrackOutcome {
        if self.inner.transport.is_none() {
            return TrackOutcome::Disabled;
        }

        let flush_now = {
            let mut state = self.inner.state();
            let event = self.inner.build_event(
                &state,
                self.scope.as_deref(),
                event_type.into(),
                event_name,
                payload,
            );
            let urgent = event.event_type.is_high_priority();
            state.queue.push_back(event);
            self.inner.persist_queue(&state.queue);
            urgent || state.queue.len() >= self.inner.config.batch_size
        };

        if !flush_now {
            return TrackOutcome::Queued;
        }
        match self.inner.spawn_flush() {
            Some(handle) => TrackOutcome::Flushing(handle),
            None => TrackOutcome::Queued,
        }
    }

    /// Sends everything queued. Failures are handled internally; the outcome is
    /// returned for callers that care.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    /// Best-effort delivery for shutdown: hands the whole queue to the beacon
    /// transport and clears it, whatever happens to the request.
    pub fn flush_sync(&self) -> bool {
        let batch: Vec<AnalyticsEvent> = {
            let mut state = self.inner.state();
            if state.queue.is_empty() {
                return false;
            }
            std::mem::take(&mut state.queue).into()
        };
        if let Err(e) = self.inner.store.remove_item(QUEUE_STORAGE_KEY) {
            debug!("Failed to clear stored event queue: {}", e);
        }

        let Some(transport) = &self.inner.transport else {
            return false;
        };
        let Some(body) = encode_batch(&batch) else {
            return false;
        };
        let sent = transport.beacon(body);
        if sent {
            Counters::add(&self.inner.counters.beaconed, batch.len());
        } else {
            debug!("Beacon refused {} analytics events.", batch.len());
        }
        sent
    }

    /// Replaces the consent snapshot. Revoking analytics discards everything
    /// buffered so far, including events waiting on a retry.
    pub fn update_consent(&self, consent: ConsentSettings) {
        let mut state = self.inner.state();
        let revoked = state.consent.analytics && !consent.analytics;
        state.consent = consent.normalized();
        if !consent.analytics {
            if !state.queue.is_empty() {
                info!(
                    "Analytics consent withdrawn; discarding {} queued events.",
                    state.queue.len()
                );
            }
            state.queue.clear();
            state.retry_counts.clear();
            self.inner.persist_queue(&state.queue);
        }
        if revoked {
            state.consent_epoch += 1;
        }
    }

    /// Forgets everything buffered for one visitor of a shared tracker: their
    /// queued events go now, and retries of anything they sent earlier are
    /// dropped when they come due. Returns how many queued events were removed.
    pub fn discard_visitor(&self, visitor: Uuid) -> usize {
        let memory = self.inner.config.revocation_memory();
        let mut state = self.inner.state();
        let now = Utc::now();
        state
            .revoked_visitors
            .retain(|_, revoked_at| now - *revoked_at < memory);
        state.revoked_visitors.insert(visitor, now);

        let before = state.queue.len();
        let (discarded, kept): (VecDeque<AnalyticsEvent>, VecDeque<AnalyticsEvent>) =
            std::mem::take(&mut state.queue)
                .into_iter()
                .partition(|event| event_visitor(event) == Some(visitor));
        state.queue = kept;
        for event in &discarded {
            state.retry_counts.remove(&event.key());
        }
        if !discarded.is_empty() {
            self.inner.persist_queue(&state.queue);
            info!(
                "Visitor {} withdrew analytics consent; discarded {} of {} queued events.",
                visitor,
                discarded.len(),
                before
            );
        }
        discarded.len()
    }

    /// Stops the background tasks. Queued events stay where they are.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    //=====================================================================================
    // Convenience recorders
    //=====================================================================================

    pub fn track_page_view(&self, page_title: &str, extra: EventPayload) -> TrackOutcome {
        let mut payload = extra;
        payload.insert("page_title".into(), json!(page_title));
        self.track(EventType::PageView, Some("navigation"), payload)
    }

    pub fn track_click(&self, element: &str, location: &str, extra: EventPayload) -> TrackOutcome {
        let mut payload = extra;
        payload.insert("click_location".into(), json!(location));
        payload.insert("element_text".into(), json!(element));
        self.track(EventType::Click, Some(element), payload)
    }

    pub fn track_cta(&self, cta_name: &str, location: &str, extra: EventPayload) -> TrackOutcome {
        let mut payload = extra;
        payload.insert("cta_location".into(), json!(location));
        payload.insert("conversion_type".into(), json!("cta_engagement"));
        self.track(EventType::CtaClick, Some(cta_name), payload)
    }

    /// Records a form submission by field names only; values never leave the form.
    pub fn track_form_submit(
        &self,
        form_name: &str,
        field_names: &[&str],
        extra: EventPayload,
    ) -> TrackOutcome {
        let mut payload = extra;
        payload.insert("form_fields".into(), json!(field_names));
        payload.insert(
            "form_completion_time".into(),
            json!(self.time_on_page()),
        );
        payload.insert("conversion_type".into(), json!("lead_generation"));
        self.track(EventType::FormSubmit, Some(form_name), payload)
    }

    pub fn track_lead_conversion(
        &self,
        conversion_type: &str,
        value: Option<f64>,
        extra: EventPayload,
    ) -> TrackOutcome {
        let mut payload = extra;
        payload.insert("conversion_value".into(), json!(value));
        payload.insert(
            "conversion_timestamp".into(),
            json!(Utc::now().timestamp_millis()),
        );
        let page = match &self.scope {
            Some(scope) => scope.page.url.clone(),
            None => self.inner.state().page.url.clone(),
        };
        payload.insert("conversion_page".into(), json!(page));
        self.track(EventType::LeadConversion, Some(conversion_type), payload)
    }

    /// Raises the scroll high-water mark. Emits an event for the highest
    /// milestone crossed by this reading, if any.
    pub fn track_scroll_depth(&self, depth: u8) -> Option<TrackOutcome> {
        let depth = depth.min(100);
        let (milestone, recorder) = match &self.scope {
            Some(scope) => {
                let milestone = highest_new_milestone(scope.scroll_depth, depth)?;
                let advanced = self.scoped(EventScope {
                    scroll_depth: depth,
                    ..EventScope::clone(scope)
                });
                (milestone, advanced)
            }
            None => {
                let mut state = self.inner.state();
                let previous = state.scroll_depth;
                if depth <= previous {
                    return None;
                }
                state.scroll_depth = depth;
                (highest_new_milestone(previous, depth)?, self.clone())
            }
        };

        let mut payload = EventPayload::new();
        payload.insert("scroll_percentage".into(), json!(depth));
        payload.insert("time_to_scroll".into(), json!(self.time_on_page()));
        Some(recorder.track(
            EventType::ScrollDepth,
            Some(&format!("{}%", milestone)),
            payload,
        ))
    }

    pub fn track_error(&self, message: &str, context: Option<&str>, stack: Option<&str>) -> TrackOutcome {
        let mut payload = EventPayload::new();
        payload.insert("error_message".into(), json!(message));
        payload.insert("error_context".into(), json!(context));
        if let Some(stack) = stack {
            let truncated: String = stack.chars().take(MAX_STACK_CHARS).collect();
            payload.insert("error_stack".into(), json!(truncated));
        }
        self.track(EventType::Error, Some("application_error"), payload)
    }

    fn time_on_page(&self) -> u64 {
        match &self.scope {
            Some(scope) => scope.time_on_page,
            None => self.inner.started.elapsed().as_millis() as u64,
        }
    }
}

fn highest_new_milestone(previous: u8, depth: u8) -> Option<u8> {
    SCROLL_MILESTONES
        .iter()
        .rev()
        .copied()
        .find(|&m| depth >= m && previous < m)
}

//=========================================================================================
// Internals
//=========================================================================================

impl TrackerInner {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_event(
        &self,
        state: &TrackerState,
        scope: Option<&EventScope>,
        event_type: EventType,
        event_name: Option<&str>,
        mut payload: EventPayload,
    ) -> AnalyticsEvent {
        let (client_id, session_id, page, scroll_depth, time_on_page) = match scope {
            Some(scope) => (
                scope.client_id,
                scope.session_id,
                &scope.page,
                scope.scroll_depth,
                scope.time_on_page,
            ),
            None => (
                self.identity.client_id,
                self.identity.session_id,
                &state.page,
                state.scroll_depth,
                self.started.elapsed().as_millis() as u64,
            ),
        };
        payload.insert("analytics_consent".into(), Value::Bool(state.consent.analytics));
        payload.insert("marketing_consent".into(), Value::Bool(state.consent.marketing));
        payload.insert("scroll_depth".into(), json!(scroll_depth));
        payload.insert("time_on_page".into(), json!(time_on_page));

        AnalyticsEvent {
            client_id,
            session_id,
            event_type,
            event_name: event_name.map(str::to_string),
            payload,
            consent_given: state.consent.analytics,
            timestamp: Utc::now(),
            page_url: page.url.clone(),
            referrer: page.referrer.clone(),
        }
    }

    fn spawn_flush(self: &Arc<Self>) -> Option<JoinHandle<FlushOutcome>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("No runtime available; leaving events queued for the next flush.");
                return None;
            }
        };
        let inner = Arc::clone(self);
        Some(runtime.spawn(async move { inner.flush().await }))
    }

    async fn flush(self: &Arc<Self>) -> FlushOutcome {
        let batch: Vec<AnalyticsEvent> = {
            let mut state = self.state();
            if state.queue.is_empty() {
                return FlushOutcome::Empty;
            }
            let batch: Vec<AnalyticsEvent> = std::mem::take(&mut state.queue).into();
            self.persist_queue(&state.queue);
            batch
        };

        let Some(transport) = &self.transport else {
            return FlushOutcome::Disabled;
        };
        let Some(body) = encode_batch(&batch) else {
            Counters::add(&self.counters.dropped, batch.len());
            return FlushOutcome::RetryScheduled {
                retrying: 0,
                dropped: batch.len(),
            };
        };

        match transport.deliver(body).await {
            Ok(()) => {
                let mut state = self.state();
                for event in &batch {
                    state.retry_counts.remove(&event.key());
                }
                Counters::add(&self.counters.delivered, batch.len());
                debug!("Delivered {} analytics events.", batch.len());
                FlushOutcome::Delivered(batch.len())
            }
            Err(PortError::NotFound(_)) => {
                let mut state = self.state();
                for event in &batch {
                    state.retry_counts.remove(&event.key());
                }
                Counters::add(&self.counters.discarded, batch.len());
                debug!(
                    "Collector endpoint not found; discarding {} events.",
                    batch.len()
                );
                FlushOutcome::Discarded(batch.len())
            }
            Err(e) => {
                debug!("Failed to send {} analytics events: {}", batch.len(), e);
                self.schedule_retries(batch)
            }
        }
    }

    fn schedule_retries(&self, batch: Vec<AnalyticsEvent>) -> FlushOutcome {
        let mut retrying = 0;
        let mut dropped = 0;
        {
            let mut state = self.state();
            let epoch = state.consent_epoch;
            for event in batch {
                let key = event.key();
                let retries = state.retry_counts.get(&key).copied().unwrap_or(0);
                if retries >= self.config.max_retries || state.is_revoked(&event) {
                    state.retry_counts.remove(&key);
                    dropped += 1;
                    continue;
                }

                let request = RetryRequest {
                    event,
                    delay: self.config.backoff_for(retries),
                    epoch,
                };
                let sent = self
                    .retries
                    .as_ref()
                    .map(|tx| tx.try_send(request).is_ok())
                    .unwrap_or(false);
                if sent {
                    state.retry_counts.insert(key, retries + 1);
                    retrying += 1;
                } else {
                    state.retry_counts.remove(&key);
                    dropped += 1;
                }
            }
        }

        Counters::add(&self.counters.retried, retrying);
        Counters::add(&self.counters.dropped, dropped);
        if dropped > 0 {
            warn!(
                "Dropped {} analytics events after {} failed delivery attempts.",
                dropped,
                self.config.max_retries + 1
            );
        }
        FlushOutcome::RetryScheduled { retrying, dropped }
    }

    /// Called by the retry scheduler when an event's backoff has expired.
    fn requeue(self: &Arc<Self>, event: AnalyticsEvent, epoch: u64) {
        {
            let mut state = self.state();
            if epoch != state.consent_epoch || state.is_revoked(&event) {
                state.retry_counts.remove(&event.key());
                Counters::add(&self.counters.dropped, 1);
                debug!("Consent changed; not retrying {} event.", event.event_type);
                return;
            }
            state.queue.push_front(event);
            self.persist_queue(&state.queue);
        }
        self.spawn_flush();
    }

    /// Mirrors the queue into storage. Best-effort: failures are logged only.
    fn persist_queue(&self, queue: &VecDeque<AnalyticsEvent>) {
        let result = serde_json::to_string(queue)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.store
                    .set_item(QUEUE_STORAGE_KEY, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!("Failed to save event queue to storage: {}", e);
        }
    }
}

fn load_queue(store: &dyn KeyValueStore) -> VecDeque<AnalyticsEvent> {
    let raw = match store.get_item(QUEUE_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return VecDeque::new(),
        Err(e) => {
            warn!("Failed to load event queue from storage: {}", e);
            return VecDeque::new();
        }
    };
    match serde_json::from_str::<VecDeque<AnalyticsEvent>>(&raw) {
        Ok(queue) => {
            if !queue.is_empty() {
                info!("Restored {} queued analytics events from storage.", queue.len());
            }
            queue
        }
        Err(e) => {
            warn!("Ignoring malformed event queue in storage: {}", e);
            VecDeque::new()
        }
    }
}

fn encode_batch(batch: &[AnalyticsEvent]) -> Option<Bytes> {
    match serde_json::to_vec(&CollectorPayload::for_batch(batch)) {
        Ok(body) => Some(Bytes::from(body)),
        Err(e) => {
            warn!("Failed to serialize {} analytics events: {}", batch.len(), e);
            None
        }
    }
}

async fn run_auto_flush(tracker: Weak<TrackerInner>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = tracker.upgrade() else { break };
                let has_events = !inner.state().queue.is_empty();
                if has_events {
                    inner.flush().await;
                }
            }
        }
    }
}

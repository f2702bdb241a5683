//! The producer stage: one `work` call per delivered chunk of stream history.
//!
//! Per cycle: derive the addressable interval, retire completed events from
//! the live index, dispatch every ready event to the worker pool, then work
//! out how many samples can be released without evicting data a live or
//! pending event still needs.

pub mod completion;
pub mod dispatch;
pub mod live_index;
pub mod metrics;
pub mod pool;
pub mod window;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SinkConfig;
use crate::error::{Result, SinkError};
use crate::event::{SampleTime, Tag, TagAccumulator};
use crate::pdu::PduHandler;
use crate::signal::{Outbound, OutboundPort};
use crate::store::ReadyEventStore;

use completion::CompletionQueue;
use dispatch::{dispatch_with_policy, DispatchOutcome, DispatchQueue};
use live_index::LiveEventIndex;
use metrics::{percent, RollingMean, SinkStats};
use pool::{EventHandler, PoolCounters, WorkerPool};
use window::{Interval, WindowController};

pub struct EventSink {
    config: SinkConfig,
    store: Arc<dyn ReadyEventStore>,
    handler: Arc<dyn EventHandler>,
    port: OutboundPort,

    window: WindowController,
    live: LiveEventIndex,
    tags: TagAccumulator,
    buffer_window_size: u64,

    counters: Arc<PoolCounters>,
    completions: Arc<CompletionQueue>,
    dispatch: Option<DispatchQueue>,
    pool: Option<WorkerPool>,

    avg_ratio: RollingMean,
    avg_utilization: RollingMean,
}

impl EventSink {
    pub fn new(
        config: SinkConfig,
        store: Arc<dyn ReadyEventStore>,
        handler: Arc<dyn EventHandler>,
        port: OutboundPort,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: WindowController::new(config.history()),
            live: LiveEventIndex::new(config.search),
            completions: Arc::new(CompletionQueue::new(config.completion_capacity)),
            config,
            store,
            handler,
            port,
            tags: TagAccumulator::new(),
            buffer_window_size: 0,
            counters: Arc::new(PoolCounters::new()),
            dispatch: None,
            pool: None,
            avg_ratio: RollingMean::default(),
            avg_utilization: RollingMean::default(),
        })
    }

    /// Sink whose handler packages every event and publishes it on `port`.
    pub fn with_pdu_handler(
        config: SinkConfig,
        store: Arc<dyn ReadyEventStore>,
        port: OutboundPort,
    ) -> Result<Self> {
        let handler = Arc::new(PduHandler::new(config.channels.clone(), port.clone()));
        Self::new(config, store, handler, port)
    }

    /// Spawn the worker pool.
    pub fn start(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Err(SinkError::AlreadyRunning);
        }
        let (queue, rx) = DispatchQueue::bounded(self.config.dispatch_capacity);
        let pool = WorkerPool::spawn(
            self.config.n_threads,
            rx,
            Arc::clone(&self.handler),
            Arc::clone(&self.counters),
            Arc::clone(&self.completions),
        )?;
        self.dispatch = Some(queue);
        self.pool = Some(pool);
        Ok(())
    }

    /// Drain every in-flight event, then tear the pool down.
    pub fn stop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        self.wait_events();
        // closing the queue lets idle workers fall out of recv
        self.dispatch = None;
        pool.join();
        self.port.publish(Outbound::ShutdownReady);
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Process one chunk of stream history and return how many of the
    /// `available` new samples the caller may retire.
    ///
    /// Each entry of `buffers` holds one channel: `history - 1` retained items
    /// followed by `available` new ones. `tags` are the stream tags visible in
    /// the new range.
    pub fn work(&mut self, buffers: &[&[u8]], available: usize, tags: &[Tag]) -> Result<usize> {
        let queue = self.dispatch.clone().ok_or(SinkError::PoolNotRunning)?;

        // 1. Tags
        let end_of_stream = self.tags.merge(tags, &self.config.end_of_stream_key);
        self.check_buffers(buffers, available)?;

        // 2. Window
        let interval = self.window.interval(available);
        self.buffer_window_size = interval.width();

        // 3. Completions
        self.completions.drain_into(&mut self.live);

        // 4. Dispatch everything that fits
        let items = self.window.buffer_items(available);
        self.dispatch_ready(&queue, buffers, interval, items)?;

        // 5. How far can the head move
        let consumable = self.consumable(interval, available);
        if consumable == 0 {
            std::thread::yield_now();
        }

        // 6. End of stream: nothing may stay in flight
        if end_of_stream {
            info!(head = self.window.head(), "end of stream observed, draining");
            self.wait_events();
            self.port.publish(Outbound::ShutdownReady);
        }

        // 7. Advance and publish
        self.window.advance(consumable);
        self.port.publish(Outbound::SamplesConsumed(self.window.head()));
        Ok(consumable)
    }

    fn check_buffers(&self, buffers: &[&[u8]], available: usize) -> Result<()> {
        let channels = &self.config.channels;
        if buffers.len() != channels.len() {
            return Err(SinkError::ChannelCountMismatch { expected: channels.len(), got: buffers.len() });
        }
        let items = self.window.buffer_items(available);
        for (channel, (buf, spec)) in buffers.iter().zip(channels).enumerate() {
            let needed = items * spec.item_size;
            if buf.len() < needed {
                return Err(SinkError::BufferTooShort { channel, needed, len: buf.len() });
            }
        }
        Ok(())
    }

    fn dispatch_ready(
        &mut self,
        queue: &DispatchQueue,
        buffers: &[&[u8]],
        interval: Interval,
        items: usize,
    ) -> Result<()> {
        let retry = Duration::from_millis(self.config.block_retry_ms);

        while let Some(mut event) = self.store.fetch_next_ready(interval.min_time, interval.max_time) {
            self.counters.record_created();

            let raw_offset = self.window.buffer_offset(event.anchor());
            let offset = if raw_offset < 0 {
                warn!(
                    event = ?event.id(),
                    anchor = event.anchor(),
                    offset = raw_offset,
                    "bad buffer offset, dropping data"
                );
                0
            } else {
                raw_offset as usize
            };

            let payload = self.slice_channels(buffers, offset, event.length(), items);
            event.attach(payload, &self.tags);

            let live = &mut self.live;
            let completions = &self.completions;
            let outcome = dispatch_with_policy(queue, event, self.config.congestion, retry, || {
                completions.drain_into(live);
            });

            match outcome {
                Ok(DispatchOutcome::Enqueued { anchor }) => self.live.insert(anchor),
                Ok(DispatchOutcome::Dropped { id, anchor }) => {
                    self.counters.revoke_created();
                    warn!(event = ?id, anchor, "dispatch queue full, event dropped");
                }
                Err(err) => {
                    self.counters.revoke_created();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn slice_channels(&self, buffers: &[&[u8]], offset: usize, length: usize, items: usize) -> Vec<Vec<u8>> {
        let start = offset.min(items);
        let end = (offset + length).min(items);
        if end - start < length {
            warn!(offset, length, kept = end - start, "event span exceeds buffer, truncating");
        }
        buffers
            .iter()
            .zip(&self.config.channels)
            .map(|(buf, spec)| buf[start * spec.item_size..end * spec.item_size].to_vec())
            .collect()
    }

    fn consumable(&self, interval: Interval, available: usize) -> usize {
        let distance = |time: Option<SampleTime>| {
            time.map_or(available as u64, |t| t.saturating_sub(interval.min_time))
        };
        let live = distance(self.live.earliest());
        let pending = distance(self.store.next_pending_time());
        (available as u64).min(live).min(pending) as usize
    }

    /// Block until every created event has completed. Completions are folded
    /// into the live index while waiting.
    pub fn wait_events(&mut self) {
        debug!(in_flight = self.counters.in_flight(), "waiting for in-flight events");
        let live = &mut self.live;
        let completions = &self.completions;
        self.counters.wait_idle(|| {
            completions.drain_into(live);
        });
        debug!("all events drained");
    }

    // --- monitoring surface ---

    pub fn head(&self) -> SampleTime {
        self.window.head()
    }

    pub fn history(&self) -> u64 {
        self.window.history()
    }

    pub fn live_events(&self) -> &[SampleTime] {
        self.live.as_slice()
    }

    pub fn tags(&self) -> &TagAccumulator {
        &self.tags
    }

    pub fn num_created(&self) -> u64 {
        self.counters.created()
    }

    pub fn num_completed(&self) -> u64 {
        self.counters.completed()
    }

    /// Events dispatched and not yet completed.
    pub fn num_events(&self) -> u64 {
        self.counters.in_flight()
    }

    pub fn num_discarded(&self) -> u64 {
        self.store.counters().discarded
    }

    pub fn num_handled_immediately(&self) -> u64 {
        self.store.counters().handled_immediately
    }

    pub fn num_received_too_late(&self) -> u64 {
        self.store.counters().received_too_late
    }

    pub fn num_events_added(&self) -> u64 {
        self.store.counters().added
    }

    pub fn num_events_removed(&self) -> u64 {
        self.store.counters().removed
    }

    pub fn buffer_window_size(&self) -> u64 {
        self.buffer_window_size
    }

    pub fn event_time(&self) -> SampleTime {
        self.store.counters().event_time
    }

    pub fn num_running_handlers(&self) -> u64 {
        self.counters.running()
    }

    /// Events still waiting in the store.
    pub fn event_queue_size(&self) -> u64 {
        self.store.len() as u64
    }

    /// Smoothed percentage of ready/running events that are actually running.
    pub fn event_run_ratio(&mut self) -> f64 {
        let ratio = percent(self.counters.running(), self.counters.in_flight());
        self.avg_ratio.push(ratio)
    }

    /// Smoothed percentage of worker threads busy in a handler.
    pub fn event_thread_utilization(&mut self) -> f64 {
        let ratio = percent(self.counters.running(), self.config.n_threads as u64);
        self.avg_utilization.push(ratio)
    }

    pub fn stats(&mut self) -> SinkStats {
        let store = self.store.counters();
        SinkStats {
            events_ready_running: self.num_events(),
            events_discarded: store.discarded,
            events_handled_immediately: store.handled_immediately,
            events_received_too_late: store.received_too_late,
            events_added: store.added,
            events_removed: store.removed,
            buffer_window_size: self.buffer_window_size,
            event_time: store.event_time,
            running_handlers: self.num_running_handlers(),
            pending_queue_len: self.event_queue_size(),
            avg_run_ratio: self.event_run_ratio(),
            avg_thread_utilization: self.event_thread_utilization(),
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        self.stop();
    }
}

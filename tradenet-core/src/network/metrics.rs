// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connection Metrics
//!
//! Per-connection traffic counters bucketed by whole minutes of
//! connection age. Sent and received traffic live in separate series, so
//! "last N minutes" means the last N minutes that saw traffic in that
//! direction, not the last N wall-clock minutes.
//!
//! Each series keeps at most [`MAX_MINUTE_BUCKETS`] buckets (24 hours).
//! Lifetime totals are tracked outside the series and never shrink.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

use super::message::NetworkEnvelope;

/// Oldest buckets beyond this count are evicted.
pub const MAX_MINUTE_BUCKETS: usize = 24 * 60;

const MINUTE_MS: u128 = 60_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counters {
    bytes: u64,
    messages: u64,
    time_ms: u64,
}

impl Counters {
    fn add(&mut self, bytes: u64, time_ms: u64) {
        self.bytes += bytes;
        self.messages += 1;
        self.time_ms += time_ms;
    }
}

/// Minute-indexed counters for one traffic direction.
#[derive(Debug, Default)]
struct MinuteSeries {
    buckets: BTreeMap<u64, Counters>,
    totals: Counters,
}

impl MinuteSeries {
    fn record(&mut self, minute: u64, bytes: u64, time_ms: u64) {
        self.buckets.entry(minute).or_default().add(bytes, time_ms);
        self.totals.add(bytes, time_ms);
        while self.buckets.len() > MAX_MINUTE_BUCKETS {
            self.buckets.pop_first();
        }
    }

    /// Sums the most recent `last` buckets.
    fn last(&self, last: usize) -> Counters {
        self.buckets
            .values()
            .rev()
            .take(last)
            .fold(Counters::default(), |mut acc, c| {
                acc.bytes += c.bytes;
                acc.messages += c.messages;
                acc.time_ms += c.time_ms;
                acc
            })
    }
}

/// Traffic and timing counters owned by one connection.
#[derive(Debug)]
pub struct ConnectionMetrics {
    created: Instant,
    created_at: SystemTime,
    /// Milliseconds of connection age at the last recorded operation.
    last_update_ms: AtomicU64,
    sent: Mutex<MinuteSeries>,
    received: Mutex<MinuteSeries>,
    rtt_samples: Mutex<Vec<u64>>,
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        ConnectionMetrics {
            created: Instant::now(),
            created_at: SystemTime::now(),
            last_update_ms: AtomicU64::new(0),
            sent: Mutex::new(MinuteSeries::default()),
            received: Mutex::new(MinuteSeries::default()),
            rtt_samples: Mutex::new(Vec::new()),
        }
    }

    /// Monotonic creation instant; bucket indices are relative to it.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Wall-clock creation time, for display.
    pub fn creation_date(&self) -> SystemTime {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Age of the connection at its most recent send or receive.
    pub fn last_update(&self) -> Duration {
        Duration::from_millis(self.last_update_ms.load(Ordering::Relaxed))
    }

    fn minute_index(&self, now: Instant) -> (u64, u64) {
        let age_ms = now.saturating_duration_since(self.created).as_millis();
        ((age_ms / MINUTE_MS) as u64, age_ms as u64)
    }

    /// Records one sent envelope and the time spent writing it.
    pub fn on_sent(&self, envelope: &NetworkEnvelope, spent: Duration) {
        self.record_sent(envelope.serialized_size(), spent, Instant::now());
    }

    /// Records one received envelope and the time spent deserializing it.
    pub fn on_received(&self, envelope: &NetworkEnvelope, deserialize_time: Duration) {
        self.record_received(envelope.serialized_size(), deserialize_time, Instant::now());
    }

    /// Records a send of `bytes` that happened at `now`.
    pub fn record_sent(&self, bytes: u64, spent: Duration, now: Instant) {
        let (minute, age_ms) = self.minute_index(now);
        self.last_update_ms.fetch_max(age_ms, Ordering::Relaxed);
        self.sent
            .lock()
            .record(minute, bytes, spent.as_millis() as u64);
    }

    /// Records a receive of `bytes` that happened at `now`.
    pub fn record_received(&self, bytes: u64, deserialize_time: Duration, now: Instant) {
        let (minute, age_ms) = self.minute_index(now);
        self.last_update_ms.fetch_max(age_ms, Ordering::Relaxed);
        self.received
            .lock()
            .record(minute, bytes, deserialize_time.as_millis() as u64);
    }

    pub fn add_rtt(&self, rtt: Duration) {
        self.rtt_samples.lock().push(rtt.as_millis() as u64);
    }

    pub fn num_rtt_samples(&self) -> usize {
        self.rtt_samples.lock().len()
    }

    /// Mean of all RTT samples in milliseconds, zero without samples.
    pub fn average_rtt_ms(&self) -> f64 {
        let samples = self.rtt_samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<u64>() as f64 / samples.len() as f64
    }

    // === Lifetime totals ===

    pub fn sent_bytes(&self) -> u64 {
        self.sent.lock().totals.bytes
    }

    pub fn num_messages_sent(&self) -> u64 {
        self.sent.lock().totals.messages
    }

    pub fn spent_send_time_ms(&self) -> u64 {
        self.sent.lock().totals.time_ms
    }

    pub fn received_bytes(&self) -> u64 {
        self.received.lock().totals.bytes
    }

    pub fn num_messages_received(&self) -> u64 {
        self.received.lock().totals.messages
    }

    pub fn deserialize_time_ms(&self) -> u64 {
        self.received.lock().totals.time_ms
    }

    // === Windowed sums over the most recent buckets ===

    pub fn sent_bytes_of_last_minutes(&self, minutes: usize) -> u64 {
        self.sent.lock().last(minutes).bytes
    }

    pub fn num_messages_sent_of_last_minutes(&self, minutes: usize) -> u64 {
        self.sent.lock().last(minutes).messages
    }

    pub fn spent_send_time_of_last_minutes(&self, minutes: usize) -> u64 {
        self.sent.lock().last(minutes).time_ms
    }

    pub fn received_bytes_of_last_minutes(&self, minutes: usize) -> u64 {
        self.received.lock().last(minutes).bytes
    }

    pub fn num_messages_received_of_last_minutes(&self, minutes: usize) -> u64 {
        self.received.lock().last(minutes).messages
    }

    pub fn deserialize_time_of_last_minutes(&self, minutes: usize) -> u64 {
        self.received.lock().last(minutes).time_ms
    }

    pub fn sent_bytes_of_last_hour(&self) -> u64 {
        self.sent_bytes_of_last_minutes(60)
    }

    pub fn num_messages_sent_of_last_hour(&self) -> u64 {
        self.num_messages_sent_of_last_minutes(60)
    }

    pub fn spent_send_time_of_last_hour(&self) -> u64 {
        self.spent_send_time_of_last_minutes(60)
    }

    pub fn received_bytes_of_last_hour(&self) -> u64 {
        self.received_bytes_of_last_minutes(60)
    }

    pub fn num_messages_received_of_last_hour(&self) -> u64 {
        self.num_messages_received_of_last_minutes(60)
    }

    pub fn deserialize_time_of_last_hour(&self) -> u64 {
        self.deserialize_time_of_last_minutes(60)
    }
}

/// Aggregate load across the live connections of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkLoad {
    pub num_connections: usize,
    pub sent_bytes_of_last_hour: u64,
    pub received_bytes_of_last_hour: u64,
    pub num_messages_sent_of_last_hour: u64,
    pub num_messages_received_of_last_hour: u64,
    /// Mean of the per-connection averages that have samples.
    pub average_rtt_ms: f64,
}

impl NetworkLoad {
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a ConnectionMetrics>) -> Self {
        let mut load = NetworkLoad::default();
        let mut rtt_sum = 0.0;
        let mut rtt_count = 0usize;
        for m in metrics {
            load.num_connections += 1;
            load.sent_bytes_of_last_hour += m.sent_bytes_of_last_hour();
            load.received_bytes_of_last_hour += m.received_bytes_of_last_hour();
            load.num_messages_sent_of_last_hour += m.num_messages_sent_of_last_hour();
            load.num_messages_received_of_last_hour += m.num_messages_received_of_last_hour();
            if m.num_rtt_samples() > 0 {
                rtt_sum += m.average_rtt_ms();
                rtt_count += 1;
            }
        }
        if rtt_count > 0 {
            load.average_rtt_ms = rtt_sum / rtt_count as f64;
        }
        load
    }
}

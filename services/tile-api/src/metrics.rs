//! Application metrics collection and reporting.

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

/// Metrics collector for the script-tile API.
#[derive(Debug)]
pub struct MetricsCollector {
    /// Request counts
    pub bounds_requests: AtomicU64,
    pub render_requests: AtomicU64,
    pub tile_requests: AtomicU64,

    /// Render stats
    pub renders_total: AtomicU64,
    pub render_errors: AtomicU64,
    pub pixel_faults: AtomicU64,

    /// Timing stats (stored as microseconds for atomic ops)
    render_times: RwLock<TimingStats>,
    encode_times: RwLock<TimingStats>,

    /// Start time for uptime calculation
    start_time: Instant,
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    last_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;
        if self.min_us == 0 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_us as f64 / self.count as f64) / 1000.0
        }
    }

    fn last_ms(&self) -> f64 {
        self.last_us as f64 / 1000.0
    }

    fn min_ms(&self) -> f64 {
        self.min_us as f64 / 1000.0
    }

    fn max_ms(&self) -> f64 {
        self.max_us as f64 / 1000.0
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            bounds_requests: AtomicU64::new(0),
            render_requests: AtomicU64::new(0),
            tile_requests: AtomicU64::new(0),
            renders_total: AtomicU64::new(0),
            render_errors: AtomicU64::new(0),
            pixel_faults: AtomicU64::new(0),
            render_times: RwLock::new(TimingStats::default()),
            encode_times: RwLock::new(TimingStats::default()),
            start_time: Instant::now(),
        }
    }

    /// Record a bounds request
    pub fn record_bounds_request(&self) {
        self.bounds_requests.fetch_add(1, Ordering::Relaxed);
        counter!("bounds_requests_total").increment(1);
    }

    /// Record a render request
    pub fn record_render_request(&self) {
        self.render_requests.fetch_add(1, Ordering::Relaxed);
        counter!("render_requests_total").increment(1);
    }

    /// Record an XYZ tile request
    pub fn record_tile_request(&self) {
        self.tile_requests.fetch_add(1, Ordering::Relaxed);
        counter!("tile_requests_total").increment(1);
    }

    /// Record a render operation
    pub async fn record_render(&self, duration_us: u64, success: bool) {
        self.renders_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.render_errors.fetch_add(1, Ordering::Relaxed);
        }
        counter!("renders_total").increment(1);
        histogram!("render_duration_ms").record(duration_us as f64 / 1000.0);

        let mut times = self.render_times.write().await;
        times.record(duration_us);
    }

    /// Record contained per-pixel faults from one render
    pub fn record_pixel_faults(&self, count: u64) {
        if count > 0 {
            self.pixel_faults.fetch_add(count, Ordering::Relaxed);
            counter!("pixel_faults_total").increment(count);
        }
    }

    /// Record PNG encoding time
    pub async fn record_png_encode(&self, duration_us: u64) {
        let mut times = self.encode_times.write().await;
        times.record(duration_us);
        histogram!("png_encode_duration_ms").record(duration_us as f64 / 1000.0);
    }

    /// Get current metrics snapshot
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let render_times = self.render_times.read().await;
        let encode_times = self.encode_times.read().await;

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),

            bounds_requests: self.bounds_requests.load(Ordering::Relaxed),
            render_requests: self.render_requests.load(Ordering::Relaxed),
            tile_requests: self.tile_requests.load(Ordering::Relaxed),

            renders_total: self.renders_total.load(Ordering::Relaxed),
            render_errors: self.render_errors.load(Ordering::Relaxed),
            pixel_faults: self.pixel_faults.load(Ordering::Relaxed),
            render_avg_ms: render_times.avg_ms(),
            render_last_ms: render_times.last_ms(),
            render_min_ms: render_times.min_ms(),
            render_max_ms: render_times.max_ms(),

            png_encode_avg_ms: encode_times.avg_ms(),
            png_encode_last_ms: encode_times.last_ms(),
            png_encode_count: encode_times.count,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics for JSON serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,

    // Request counts
    pub bounds_requests: u64,
    pub render_requests: u64,
    pub tile_requests: u64,

    // Render stats
    pub renders_total: u64,
    pub render_errors: u64,
    pub pixel_faults: u64,
    pub render_avg_ms: f64,
    pub render_last_ms: f64,
    pub render_min_ms: f64,
    pub render_max_ms: f64,

    // Encoding stats
    pub png_encode_avg_ms: f64,
    pub png_encode_last_ms: f64,
    pub png_encode_count: u64,
}

/// Timer guard for measuring operation duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

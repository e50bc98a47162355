//! Timing helpers for device transfers, kernel compilation and launches.
//!
//! ```rust
//! use pic_tracing::performance::{record_transfer, PerformanceSpan};
//!
//! let span = PerformanceSpan::new("send_data_to_device", Some(100));
//! record_transfer(4096, "H2D", 250);
//! drop(span); // logged only if it took at least 100us
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;

static PERF_ENABLED: AtomicBool = AtomicBool::new(true);
// u64::MAX encodes "no global threshold".
static PERF_THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Install process-wide performance span settings.
///
/// Called by [`crate::build_subscriber`]; spans created before a subscriber
/// is installed use the defaults (enabled, no threshold).
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    PERF_ENABLED.store(enabled, Ordering::Relaxed);
    PERF_THRESHOLD_US.store(threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

/// Whether performance spans are currently logged.
pub fn is_enabled() -> bool {
    PERF_ENABLED.load(Ordering::Relaxed)
}

fn global_threshold() -> Option<u64> {
    match PERF_THRESHOLD_US.load(Ordering::Relaxed) {
        u64::MAX => None,
        t => Some(t),
    }
}

/// RAII guard that measures its own lifetime and logs it on drop when the
/// duration reaches the threshold.
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    start_time: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Create a debug-level span. `threshold_us = None` falls back to the
    /// process-wide threshold, if any.
    pub fn new(span_name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, span_name, threshold_us)
    }

    pub fn with_level(level: Level, span_name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = span_name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };

        Self {
            name,
            threshold_us: threshold_us.or_else(global_threshold),
            start_time: Instant::now(),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold_us(&self) -> Option<u64> {
        self.threshold_us
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    /// Enter this span's context.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.map_or(true, |t| elapsed_us >= t) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Record a host/device transfer with its bandwidth.
///
/// `direction` is `"H2D"` or `"D2H"`.
pub fn record_transfer(bytes: usize, direction: &str, duration_us: u64) {
    let bandwidth_mbps = bandwidth_mbps(bytes, duration_us);

    tracing::debug!(
        event = "transfer",
        bytes = bytes,
        direction = direction,
        duration_us = duration_us,
        bandwidth_mbps = bandwidth_mbps,
        "data_transfer"
    );
}

/// Record one kernel specialization.
pub fn record_compilation(kernel: &str, signature: &str, compiler: &str, duration_us: u64) {
    tracing::debug!(
        event = "compilation",
        kernel = kernel,
        signature = signature,
        compiler = compiler,
        duration_us = duration_us,
        duration_ms = duration_us as f64 / 1000.0,
        "kernel_specialized"
    );
}

/// Record a kernel launch with its geometry and the number of marshalled params.
pub fn record_launch(kernel: &str, blocks: u32, threads: u32, params: usize, duration_us: u64) {
    tracing::trace!(
        event = "launch",
        kernel = kernel,
        blocks = blocks,
        threads_per_block = threads,
        params = params,
        duration_us = duration_us,
        "kernel_launch"
    );
}

fn bandwidth_mbps(bytes: usize, duration_us: u64) -> f64 {
    if duration_us > 0 {
        (bytes as f64 / duration_us as f64) * 1_000_000.0 / (1024.0 * 1024.0)
    } else {
        0.0
    }
}

//! Shorthand macros over [`crate::performance`].

/// Create a [`crate::performance::PerformanceSpan`] with optional fields.
///
/// ```rust
/// use pic_tracing::perf_span;
///
/// let _span = perf_span!("receive_data_from_device", species = 2);
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::new($name, None)
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        $crate::tracing::debug!(name = $name, $($field = $value),+, "perf_span_start");
        $crate::performance::PerformanceSpan::new($name, None)
    }};
}

/// Emit a debug-level event tagged with `event = $name`.
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        $crate::tracing::debug!(event = $name, $($field = $value),+)
    };
}

/// Run a block and return `(result, duration_us)`, logging the duration.
///
/// ```rust
/// use pic_tracing::timed_block;
///
/// let (sum, _us) = timed_block!("sum", { (1..=10).sum::<i32>() });
/// assert_eq!(sum, 55);
/// ```
#[macro_export]
macro_rules! timed_block {
    ($name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        let duration_us = start.elapsed().as_micros() as u64;
        $crate::tracing::debug!(operation = $name, duration_us = duration_us, "timed_block_complete");
        (result, duration_us)
    }};
}

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, sanitize_url, truncate_for_log, DEFAULT_LOG_FILTER};
pub use metrics::{Metrics, MetricsRegistry};

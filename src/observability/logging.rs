use tracing::subscriber::set_global_default;
use tracing_subscriber::{
    fmt::{self, format::JsonFields},
    layer::SubscriberExt,
    EnvFilter, Registry,
};
use crate::error::{RankError, RankResult};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,room_rank_api=debug";

/// Longest free text emitted into a log line
const MAX_LOGGED_TEXT: usize = 120;

/// Initialize the global tracing subscriber with JSON formatting
pub fn init_logging() -> RankResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let formatting_layer = fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(true)
        .fmt_fields(JsonFields::new());

    let subscriber = Registry::default()
        .with(env_filter)
        .with(formatting_layer);

    set_global_default(subscriber)
        .map_err(|e| RankError::Internal(format!("Failed to set global subscriber: {}", e)))?;

    Ok(())
}

/// Mask credentials in a connection URL before it is logged
pub fn sanitize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut sanitized = parsed.clone();
            if parsed.password().is_some() {
                let _ = sanitized.set_password(Some("***"));
            }
            if !parsed.username().is_empty() {
                let _ = sanitized.set_username("***");
            }
            sanitized.to_string()
        }
        // Unparseable: keep only the scheme
        Err(_) => match url.find("://") {
            Some(pos) => format!("{}://***", &url[..pos]),
            None => "***".to_string(),
        },
    }
}

/// Shorten review or request text for log lines, on a char boundary
pub fn truncate_for_log(text: &str) -> String {
    if text.chars().count() <= MAX_LOGGED_TEXT {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_LOGGED_TEXT - 3).collect();
    truncated.push_str("...");
    truncated
}

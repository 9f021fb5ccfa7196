//! # talkback-observability
//!
//! Observability-Crate fuer Talkback:
//! - Structured Logging via tracing-subscriber (Text oder JSON)
//! - Protokollierung der Sitzungs-Ereignisse als Tracing-Events

pub mod ereignisse;
pub mod logging;

pub use ereignisse::ereignisse_protokollieren;
pub use logging::{
    log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat, LoggingError,
};

//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `TB_LOG_LEVEL`: Filter-Direktive (z.B. `debug` oder
//!   `info,talkback_session=trace`), Standard aus der Konfiguration
//! - `TB_LOG_FORMAT`: Format (text/json), Standard aus der Konfiguration
//!
//! Die Umgebung hat Vorrang vor der Konfigurationsdatei.

use std::str::FromStr;

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "TB_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TB_LOG_FORMAT";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Ungueltiges Log-Format: {0} (erlaubt: text, json)")]
    UngueltigesFormat(String),
    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            andere => Err(LoggingError::UngueltigesFormat(andere.to_string())),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `level` und `format` kommen aus der Konfiguration und werden von
/// `TB_LOG_LEVEL` / `TB_LOG_FORMAT` ueberschrieben. Die Konfiguration
/// prueft beides vorab mit `log_level_gueltig` und `log_format_gueltig`;
/// ein dennoch ungueltiger Filter faellt auf `info` zurueck, ein
/// ungueltiges Format ist ein Fehler.
/// Darf nur einmal pro Prozess aufgerufen werden.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<LogFormat, LoggingError> {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format: LogFormat = format_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format).parse()?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| LoggingError::BereitsInitialisiert(e.to_string()))?;
    Ok(format)
}

fn format_waehlen(aus_env: Option<String>, standard: &str) -> String {
    aus_env
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| standard.to_string())
}

fn ist_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error" | "off")
}

/// Validiert eine Filter-Direktive aus der Konfiguration.
///
/// Erlaubt sind ein Level (`debug`) oder eine Liste aus Level und
/// `ziel=level`-Paaren (`info,talkback_session=trace`).
pub fn log_level_gueltig(level: &str) -> bool {
    !level.is_empty()
        && level.split(',').all(|teil| match teil.split_once('=') {
            Some((ziel, lvl)) => !ziel.trim().is_empty() && ist_level(lvl.trim()),
            None => ist_level(teil.trim()),
        })
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level}");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
        assert!(!log_level_gueltig("info,"));
        assert!(!log_level_gueltig("=debug"));
        assert!(!log_level_gueltig("talkback_session=laut"));
    }

    #[test]
    fn log_level_direktiven() {
        assert!(log_level_gueltig("info,talkback_session=trace"));
        assert!(log_level_gueltig("warn, talkback_audio=debug"));
        assert!(log_level_gueltig("off"));
    }

    #[test]
    fn log_format_parsen() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::UngueltigesFormat(f)) if f == "xml"
        ));
        assert!(!log_format_gueltig("JSON"));
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(format_waehlen(Some("json".into()), "text"), "json");
        assert_eq!(format_waehlen(None, "text"), "text");
        // Leere Variable zaehlt als nicht gesetzt
        assert_eq!(format_waehlen(Some(String::new()), "json"), "json");
    }

    #[test]
    fn zweite_initialisierung_schlaegt_fehl() {
        // Erster Aufruf kann schon durch einen anderen Test passiert sein
        let _ = logging_initialisieren("debug", "text");
        assert!(matches!(
            logging_initialisieren("debug", "text"),
            Err(LoggingError::BereitsInitialisiert(_))
        ));
    }
}

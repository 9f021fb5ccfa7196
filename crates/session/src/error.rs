//! Fehlertypen der Sitzung

use thiserror::Error;

/// Fehler des Transports
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Verbindungsaufbau fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung ist geschlossen")]
    Geschlossen,
}

//! Fehlertypen fuer die Audio-Pipeline
//!
//! Jede Stufe hat einen eigenen Fehler-Enum. `AudioError` deckt die
//! Geraetesuche ab.

use thiserror::Error;

/// Fehler der Aufnahme
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Mikrofonzugriff verweigert: {0}")]
    PermissionDenied(String),

    #[error("Kein Aufnahmegeraet verfuegbar: {0}")]
    NoDevice(String),

    #[error("Nicht unterstuetztes Aufnahmeformat: {0}")]
    UnsupportedFormat(String),

    #[error("Keine Audiodaten aufgenommen")]
    EmptyCapture,

    #[error("Es laeuft bereits eine Aufnahme")]
    Busy,

    #[error("Aufnahme-Handle ist nicht mehr gueltig")]
    StaleHandle,

    #[error("Stream-Fehler: {0}")]
    Stream(String),

    #[error("Codec-Fehler: {0}")]
    Codec(String),
}

/// Fehler der Transkodierung
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Container nicht dekodierbar: {0}")]
    Decode(String),

    #[error("Resampling fehlgeschlagen: {0}")]
    Resample(String),
}

/// Fehler der Wiedergabe
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Kein Ausgabegeraet verfuegbar: {0}")]
    NoDevice(String),

    #[error("Stream-Fehler: {0}")]
    Stream(String),
}

/// Fehler bei Suche und Abfrage der Audio-Geraete
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

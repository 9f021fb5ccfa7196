//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! gegen einen lokalen Server lauffaehig ist.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use talkback_audio::{CaptureConfig, CaptureSettings, PlaybackConfig, SchedulerConfig};
use talkback_core::SessionId;
use talkback_observability::{log_format_gueltig, log_level_gueltig};
use talkback_protocol::StreamEndpoint;
use talkback_session::{BargeIn, SessionConfig};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server und Wiederverbindung
    pub verbindung: VerbindungsEinstellungen,
    /// Geraete und Abtastraten
    pub audio: AudioEinstellungen,
    /// Verhalten der Sitzung
    pub sitzung: SitzungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// ws(s)-URL des Servers
    pub base_url: String,
    /// Zweck-Segment im Stream-Pfad
    pub purpose: String,
    /// Feste Sitzungs-ID, sonst zufaellig
    pub session_id: Option<String>,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:8000".into(),
            purpose: "assistant".into(),
            session_id: None,
            reconnect_delay_ms: 5000,
            max_reconnect_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Teil des Namens des Eingabegeraets
    pub input_device: Option<String>,
    /// Teil des Namens des Ausgabegeraets
    pub output_device: Option<String>,
    pub capture_sample_rate: u32,
    pub capture_channels: u16,
    pub upload_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub max_utterance_secs: u64,
    /// Puffer gleichzeitig beim Ausgabegeraet
    pub playback_lookahead: usize,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            capture_sample_rate: 48000,
            capture_channels: 1,
            upload_sample_rate: talkback_protocol::UPLOAD_SAMPLE_RATE,
            playback_sample_rate: talkback_protocol::PLAYBACK_SAMPLE_RATE,
            max_utterance_secs: 10,
            playback_lookahead: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    /// Sprechtaste waehrend der Server spricht: ablehnen oder unterbrechen
    pub barge_in: BargeIn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace/debug/info/warn/error)
    pub level: String,
    /// Format (text/json)
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Fehlt die Datei, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::parsen(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Logging steht hier noch nicht, daher direkt auf stderr
                eprintln!(
                    "Konfigurationsdatei '{pfad}' nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    pub fn parsen(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte, die TOML allein nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!(
                "Ungueltiges Log-Level '{}' (erlaubt: trace, debug, info, warn, error, off oder ziel=level)",
                self.logging.level
            );
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!(
                "Ungueltiges Log-Format '{}' (erlaubt: text, json)",
                self.logging.format
            );
        }
        if self.audio.playback_sample_rate == 0 || self.audio.upload_sample_rate == 0 {
            anyhow::bail!("Abtastraten muessen groesser als 0 sein");
        }
        Ok(())
    }

    /// Sitzungs-ID aus der Konfiguration oder eine neue zufaellige
    pub fn session_id(&self) -> anyhow::Result<SessionId> {
        match &self.verbindung.session_id {
            Some(id) => SessionId::from_str_checked(id)
                .with_context(|| format!("Ungueltige Sitzungs-ID '{id}'")),
            None => Ok(SessionId::new()),
        }
    }

    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let endpoint = StreamEndpoint::neu(
            &self.verbindung.base_url,
            &self.verbindung.purpose,
            self.session_id()?,
        )?;
        let mut config = SessionConfig::new(endpoint);
        config.reconnect_delay = Duration::from_millis(self.verbindung.reconnect_delay_ms);
        config.max_reconnect_attempts = self.verbindung.max_reconnect_attempts;
        config.upload_sample_rate = self.audio.upload_sample_rate;
        config.playback_sample_rate = self.audio.playback_sample_rate;
        config.barge_in = self.sitzung.barge_in;
        Ok(config)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.audio.input_device.clone(),
            sample_rate: self.audio.capture_sample_rate,
            channels: self.audio.capture_channels,
            ..CaptureConfig::default()
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_utterance: Duration::from_secs(self.audio.max_utterance_secs),
        }
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            device: self.audio.output_device.clone(),
            sample_rate: self.audio.playback_sample_rate,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            lookahead: self.audio.playback_lookahead,
            ..SchedulerConfig::default()
        }
    }
}

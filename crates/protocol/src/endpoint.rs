//! Stream-Endpunkte
//!
//! Eine Sitzung spricht genau einen Endpunkt an:
//! `<base_url>/stream/<zweck>/<sitzungs-id>`.

use talkback_core::SessionId;
use thiserror::Error;
use url::Url;

/// Fehler beim Zusammensetzen eines Endpunkts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Ungueltige Basis-URL '{url}': {grund}")]
    UngueltigeUrl { url: String, grund: String },

    #[error("Nicht unterstuetztes Schema '{0}', erwartet ws oder wss")]
    FalschesSchema(String),

    #[error("Ungueltiges Pfadsegment fuer den Zweck: '{0}'")]
    UngueltigerZweck(String),
}

/// Vollstaendig aufgeloester Stream-Endpunkt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    url: Url,
    zweck: String,
    session_id: SessionId,
}

impl StreamEndpoint {
    /// Setzt den Endpunkt aus Basis-URL, Zweck und Sitzungs-ID zusammen
    pub fn neu(base_url: &str, zweck: &str, session_id: SessionId) -> Result<Self, EndpointError> {
        let mut basis = Url::parse(base_url).map_err(|e| EndpointError::UngueltigeUrl {
            url: base_url.to_string(),
            grund: e.to_string(),
        })?;

        if !matches!(basis.scheme(), "ws" | "wss") {
            return Err(EndpointError::FalschesSchema(basis.scheme().to_string()));
        }
        if zweck.is_empty() || zweck.contains('/') || zweck.contains('?') || zweck.contains('#') {
            return Err(EndpointError::UngueltigerZweck(zweck.to_string()));
        }

        // Url::join ersetzt das letzte Segment ohne abschliessenden Slash
        if !basis.path().ends_with('/') {
            let pfad = format!("{}/", basis.path());
            basis.set_path(&pfad);
        }
        let relativ = format!("stream/{}/{}", zweck, session_id.as_str());
        let url = basis
            .join(&relativ)
            .map_err(|e| EndpointError::UngueltigeUrl {
                url: base_url.to_string(),
                grund: e.to_string(),
            })?;

        Ok(Self {
            url,
            zweck: zweck.to_string(),
            session_id,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn zweck(&self) -> &str {
        &self.zweck
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Host fuer Statusmeldungen, ohne Pfad
    pub fn host_anzeige(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => self.url.to_string(),
        }
    }
}

impl std::fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

//! Identifikationstypen fuer Talkback
//!
//! Newtype-Pattern wie in den uebrigen Crates, damit eine Sitzungs-ID
//! nicht mit beliebigen Strings verwechselt wird.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sitzungs-ID, letztes Segment des Stream-Pfads
///
/// Der Server vergibt keine IDs; der Client waehlt sie selbst. Ohne
/// Vorgabe wird eine zufaellige UUID verwendet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Uebernimmt eine vorgegebene ID
    ///
    /// Gibt `None` zurueck wenn die ID leer ist oder Zeichen enthaelt,
    /// die kein einzelnes Pfadsegment ergeben.
    pub fn from_str_checked(id: &str) -> Option<Self> {
        let gueltig = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        gueltig.then(|| Self(id.to_string()))
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_eindeutig() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn vorgegebene_id_pruefen() {
        assert_eq!(SessionId::from_str_checked("123").map(|s| s.to_string()), Some("123".into()));
        assert!(SessionId::from_str_checked("").is_none());
        assert!(SessionId::from_str_checked("a/b").is_none());
        assert!(SessionId::from_str_checked("a b").is_none());
    }

    #[test]
    fn session_id_serde_transparent() {
        let id = SessionId::from_str_checked("abc-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-1\"");
        let id2: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }
}

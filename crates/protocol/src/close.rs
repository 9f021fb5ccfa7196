//! Close-Codes der Stream-Verbindung
//!
//! Normales Schliessen (1000) und "kein Status" (1005, auch wenn gar
//! kein Code uebermittelt wurde) beenden die Sitzung. Jeder andere Code
//! fuehrt zu genau einem Wiederverbindungsversuch nach fester Wartezeit.

use serde::{Deserialize, Serialize};

/// Close-Code einer WebSocket-Verbindung (RFC 6455)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);

    /// Normal im Sinne der Wiederverbindungs-Regel
    pub fn ist_normal(&self) -> bool {
        *self == Self::NORMAL || *self == Self::NO_STATUS
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Was nach dem Schliessen passiert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Sitzung bleibt getrennt
    Beenden,
    /// Ein Wiederverbindungsversuch nach fester Wartezeit
    Wiederverbinden,
}

impl CloseDisposition {
    /// Bewertet einen empfangenen Close-Code
    ///
    /// `None` (Verbindung ohne Close-Frame beendet) gilt wie 1005.
    pub fn fuer(code: Option<CloseCode>) -> Self {
        match code {
            None => CloseDisposition::Beenden,
            Some(c) if c.ist_normal() => CloseDisposition::Beenden,
            Some(_) => CloseDisposition::Wiederverbinden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normale_codes_beenden() {
        assert_eq!(
            CloseDisposition::fuer(Some(CloseCode::NORMAL)),
            CloseDisposition::Beenden
        );
        assert_eq!(
            CloseDisposition::fuer(Some(CloseCode::NO_STATUS)),
            CloseDisposition::Beenden
        );
        assert_eq!(CloseDisposition::fuer(None), CloseDisposition::Beenden);
    }

    #[test]
    fn andere_codes_wiederverbinden() {
        for code in [1001u16, 1006, 1011, 4000] {
            assert_eq!(
                CloseDisposition::fuer(Some(CloseCode(code))),
                CloseDisposition::Wiederverbinden,
                "Code {code}"
            );
        }
    }
}

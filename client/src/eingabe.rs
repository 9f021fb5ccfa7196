//! Tastatur-Befehle des Terminal-Clients

/// Eine eingelesene Zeile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eingabe {
    /// Enter: Sprechtaste umschalten
    Taste,
    /// Statusverlauf ausgeben
    Verlauf,
    /// Audio-Geraete auflisten
    Geraete,
    Beenden,
    Unbekannt,
}

impl Eingabe {
    pub fn parsen(zeile: &str) -> Self {
        match zeile.trim().to_ascii_lowercase().as_str() {
            "" => Eingabe::Taste,
            "l" | "log" => Eingabe::Verlauf,
            "g" | "geraete" => Eingabe::Geraete,
            "q" | "quit" | "exit" => Eingabe::Beenden,
            _ => Eingabe::Unbekannt,
        }
    }
}

pub const HILFE: &str =
    "Enter = Sprechen starten/stoppen, l = Statusverlauf, g = Geraete, q = Beenden";

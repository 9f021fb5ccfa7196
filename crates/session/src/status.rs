//! Begrenztes Protokoll der Statusmeldungen

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wie viele Meldungen behalten werden
pub const STATUS_LOG_KAPAZITAET: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEintrag {
    pub zeit: DateTime<Utc>,
    pub text: String,
}

/// Die letzten Statusmeldungen, aelteste zuerst
#[derive(Debug, Clone)]
pub struct StatusLog {
    eintraege: VecDeque<StatusEintrag>,
    kapazitaet: usize,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(STATUS_LOG_KAPAZITAET)
    }
}

impl StatusLog {
    pub fn new(kapazitaet: usize) -> Self {
        let kapazitaet = kapazitaet.max(1);
        Self {
            eintraege: VecDeque::with_capacity(kapazitaet),
            kapazitaet,
        }
    }

    pub fn hinzufuegen(&mut self, text: impl Into<String>) {
        if self.eintraege.len() == self.kapazitaet {
            self.eintraege.pop_front();
        }
        self.eintraege.push_back(StatusEintrag {
            zeit: Utc::now(),
            text: text.into(),
        });
    }

    pub fn eintraege(&self) -> Vec<StatusEintrag> {
        self.eintraege.iter().cloned().collect()
    }

    pub fn letzter(&self) -> Option<&StatusEintrag> {
        self.eintraege.back()
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aelteste_fallen_heraus() {
        let mut log = StatusLog::new(3);
        for i in 0..5 {
            log.hinzufuegen(format!("m{i}"));
        }
        let texte: Vec<String> = log.eintraege().into_iter().map(|e| e.text).collect();
        assert_eq!(texte, vec!["m2", "m3", "m4"]);
        assert_eq!(log.letzter().map(|e| e.text.as_str()), Some("m4"));
    }

    #[test]
    fn standard_kapazitaet() {
        let mut log = StatusLog::default();
        for i in 0..150 {
            log.hinzufuegen(i.to_string());
        }
        assert_eq!(log.len(), STATUS_LOG_KAPAZITAET);
    }

    #[test]
    fn zeitstempel_steigen() {
        let mut log = StatusLog::default();
        log.hinzufuegen("a");
        log.hinzufuegen("b");
        let e = log.eintraege();
        assert!(e[0].zeit <= e[1].zeit);
    }
}

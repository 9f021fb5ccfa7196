//! talkback-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Talkback-Crates gemeinsam genutzt werden: Sitzungs-IDs, die
//! Zustands-Enums der Duplex-Sitzung und ihre Ereignisse.

pub mod event;
pub mod state;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::SessionEvent;
pub use state::{ConnectionState, SessionSnapshot, TurnState};
pub use types::SessionId;

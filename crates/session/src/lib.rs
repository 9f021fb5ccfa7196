//! talkback-session – Duplex-Sprechsitzung
//!
//! Verbindet Aufnahme, Transport und Wiedergabe zu einem Sprechzug:
//! Taste druecken, sprechen, loslassen, Antwort hoeren. Die Sitzung
//! laeuft als eigener tokio-Task und wird ueber `SessionHandle` bedient.

pub mod error;
pub mod handle;
pub mod reconnect;
pub mod session;
pub mod status;
pub mod transport;
pub mod turn;

pub use error::TransportError;
pub use handle::{SessionHandle, TalkResponse};
pub use reconnect::{Folge, Reconnector};
pub use session::{DuplexSession, SessionAudio, SessionConfig};
pub use status::{StatusEintrag, StatusLog};
pub use transport::{
    Ausgehend, Connector, Eingehend, MemoryConnector, ServerSeite, Transport, WebSocketConnector,
};
pub use turn::{Ablehnung, BargeIn, ChunkAktion, Druck, TurnMachine};

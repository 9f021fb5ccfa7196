//! Transport der Sitzung
//!
//! Eine Verbindung besteht aus zwei Kanaelen: ausgehende Nachrichten
//! gehen an einen Writer-Task, eingehende kommen von einem Reader-Task.
//! Der Reader meldet das Ende der Verbindung genau einmal als
//! `Eingehend::Geschlossen` mit Close-Code:
//!
//! - Close-Frame mit Code: dieser Code
//! - Close-Frame ohne Code: 1005
//! - Abbruch ohne Close-Frame oder Lesefehler: 1006
//!
//! Wird der `Transport` gedroppt, enden beide Tasks; veraltete
//! Nachrichten einer ersetzten Verbindung koennen nicht mehr ankommen.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use talkback_protocol::{encode_pcm_frame, CloseCode, StreamEndpoint};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;

/// Nachricht an die Gegenstelle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ausgehend {
    Binaer(Bytes),
    Schliessen(CloseCode),
}

/// Nachricht von der Gegenstelle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingehend {
    Text(String),
    Binaer(Bytes),
    Geschlossen(CloseCode),
}

/// Eine aufgebaute Verbindung
#[derive(Debug)]
pub struct Transport {
    ausgang: mpsc::UnboundedSender<Ausgehend>,
    eingang: mpsc::UnboundedReceiver<Eingehend>,
}

impl Transport {
    pub fn new(
        ausgang: mpsc::UnboundedSender<Ausgehend>,
        eingang: mpsc::UnboundedReceiver<Eingehend>,
    ) -> Self {
        Self { ausgang, eingang }
    }

    pub fn send_binary(&self, daten: Bytes) -> Result<(), TransportError> {
        self.ausgang
            .send(Ausgehend::Binaer(daten))
            .map_err(|_| TransportError::Geschlossen)
    }

    /// Schliesst die Verbindung; ist sie schon weg, passiert nichts
    pub fn close(&self, code: CloseCode) {
        if self.ausgang.send(Ausgehend::Schliessen(code)).is_err() {
            trace!(%code, "Transport war bereits geschlossen");
        }
    }

    /// Naechste eingehende Nachricht
    ///
    /// Ein verschwundener Reader zaehlt als Abbruch (1006).
    pub async fn recv(&mut self) -> Eingehend {
        self.eingang
            .recv()
            .await
            .unwrap_or(Eingehend::Geschlossen(CloseCode::ABNORMAL))
    }
}

/// Baut Verbindungen zu einem Stream-Endpunkt auf
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<Transport, TransportError>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Verbindung ueber WebSocket (ws/wss)
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<Transport, TransportError> {
        let (ws_stream, _) = connect_async(endpoint.url().as_str())
            .await
            .map_err(|e| TransportError::Verbindung(e.to_string()))?;
        info!(url = %endpoint, "WebSocket-Verbindung hergestellt");

        let (mut write, mut read) = ws_stream.split();
        let (aus_tx, mut aus_rx) = mpsc::unbounded_channel::<Ausgehend>();
        let (ein_tx, ein_rx) = mpsc::unbounded_channel::<Eingehend>();

        // Writer: Kanal -> WebSocket
        tokio::spawn(async move {
            while let Some(nachricht) = aus_rx.recv().await {
                let ergebnis = match nachricht {
                    Ausgehend::Binaer(daten) => write.send(Message::Binary(daten.to_vec())).await,
                    Ausgehend::Schliessen(code) => {
                        let frame = CloseFrame {
                            code: WsCloseCode::from(code.0),
                            reason: "".into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            debug!(fehler = %e, "Close-Frame nicht gesendet");
                        }
                        break;
                    }
                };
                if let Err(e) = ergebnis {
                    warn!(fehler = %e, "Senden fehlgeschlagen");
                    break;
                }
            }
            let _ = write.close().await;
            trace!("WebSocket-Writer beendet");
        });

        // Reader: WebSocket -> Kanal
        tokio::spawn(async move {
            let code = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if ein_tx.send(Eingehend::Text(text)).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(daten))) => {
                        if ein_tx.send(Eingehend::Binaer(Bytes::from(daten))).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| CloseCode(u16::from(f.code)))
                            .unwrap_or(CloseCode::NO_STATUS);
                    }
                    // Ping beantwortet tungstenite selbst
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(fehler = %e, "WebSocket-Lesefehler");
                        break CloseCode::ABNORMAL;
                    }
                    None => break CloseCode::ABNORMAL,
                }
            };
            debug!(%code, "WebSocket geschlossen");
            let _ = ein_tx.send(Eingehend::Geschlossen(code));
        });

        Ok(Transport::new(aus_tx, ein_rx))
    }
}

// ---------------------------------------------------------------------------
// In-Memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryZustand {
    versuche: usize,
    fehlschlaege_offen: usize,
    endpunkte: Vec<String>,
}

/// Verbindet mit einer Gegenstelle im selben Prozess
///
/// Jede erfolgreiche Verbindung liefert eine `ServerSeite` ueber den
/// Empfaenger aus `new()`. Klone teilen sich den Zustand.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    zustand: Arc<Mutex<MemoryZustand>>,
    server_tx: mpsc::UnboundedSender<ServerSeite>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSeite>) {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let connector = Self {
            zustand: Arc::new(Mutex::new(MemoryZustand::default())),
            server_tx,
        };
        (connector, server_rx)
    }

    /// Die naechsten `n` Verbindungsversuche schlagen fehl
    pub fn fehlschlagen_lassen(&self, n: usize) {
        self.zustand.lock().fehlschlaege_offen = n;
    }

    /// Anzahl aller Verbindungsversuche, auch der fehlgeschlagenen
    pub fn versuche(&self) -> usize {
        self.zustand.lock().versuche
    }

    pub fn endpunkte(&self) -> Vec<String> {
        self.zustand.lock().endpunkte.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<Transport, TransportError> {
        {
            let mut z = self.zustand.lock();
            z.versuche += 1;
            z.endpunkte.push(endpoint.to_string());
            if z.fehlschlaege_offen > 0 {
                z.fehlschlaege_offen -= 1;
                return Err(TransportError::Verbindung("Verbindung abgelehnt".into()));
            }
        }

        let (aus_tx, aus_rx) = mpsc::unbounded_channel();
        let (ein_tx, ein_rx) = mpsc::unbounded_channel();
        self.server_tx
            .send(ServerSeite {
                von_client: aus_rx,
                an_client: ein_tx,
            })
            .map_err(|_| TransportError::Verbindung("Keine Gegenstelle".into()))?;
        Ok(Transport::new(aus_tx, ein_rx))
    }
}

/// Gegenstelle einer In-Memory-Verbindung
#[derive(Debug)]
pub struct ServerSeite {
    von_client: mpsc::UnboundedReceiver<Ausgehend>,
    an_client: mpsc::UnboundedSender<Eingehend>,
}

impl ServerSeite {
    pub fn text_senden(&self, text: &str) {
        let _ = self.an_client.send(Eingehend::Text(text.to_string()));
    }

    pub fn binaer_senden(&self, daten: impl Into<Bytes>) {
        let _ = self.an_client.send(Eingehend::Binaer(daten.into()));
    }

    /// Sendet Samples als PCM-Frame
    pub fn pcm_senden(&self, samples: &[i16]) {
        self.binaer_senden(encode_pcm_frame(samples));
    }

    /// Schliesst mit Close-Frame; `None` wie ein Frame ohne Code
    pub fn schliessen(&self, code: Option<CloseCode>) {
        let code = code.unwrap_or(CloseCode::NO_STATUS);
        let _ = self.an_client.send(Eingehend::Geschlossen(code));
    }

    /// Bricht die Verbindung ohne Close-Frame ab
    pub fn abbrechen(self) {}

    /// Naechste Nachricht des Clients, `None` wenn der Client weg ist
    pub async fn empfangen(&mut self) -> Option<Ausgehend> {
        self.von_client.recv().await
    }

    /// Nachricht des Clients ohne zu warten
    pub fn empfangen_sofort(&mut self) -> Option<Ausgehend> {
        self.von_client.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talkback_core::SessionId;

    fn endpoint() -> StreamEndpoint {
        StreamEndpoint::neu(
            "ws://localhost:8000",
            "echo",
            SessionId::from_str_checked("123").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn memory_verbindung_in_beide_richtungen() {
        let (connector, mut server_rx) = MemoryConnector::new();
        let mut transport = connector.connect(&endpoint()).await.unwrap();
        let mut server = server_rx.recv().await.unwrap();

        transport.send_binary(Bytes::from_static(&[1, 0])).unwrap();
        assert_eq!(
            server.empfangen().await,
            Some(Ausgehend::Binaer(Bytes::from_static(&[1, 0])))
        );

        server.text_senden("{\"status\":\"ok\"}");
        assert_eq!(
            transport.recv().await,
            Eingehend::Text("{\"status\":\"ok\"}".into())
        );
        assert_eq!(connector.endpunkte(), vec!["ws://localhost:8000/stream/echo/123"]);
    }

    #[tokio::test]
    async fn abbruch_ohne_close_frame_ist_1006() {
        let (connector, mut server_rx) = MemoryConnector::new();
        let mut transport = connector.connect(&endpoint()).await.unwrap();
        server_rx.recv().await.unwrap().abbrechen();
        assert_eq!(transport.recv().await, Eingehend::Geschlossen(CloseCode::ABNORMAL));
    }

    #[tokio::test]
    async fn close_ohne_code_ist_1005() {
        let (connector, mut server_rx) = MemoryConnector::new();
        let mut transport = connector.connect(&endpoint()).await.unwrap();
        let server = server_rx.recv().await.unwrap();
        server.schliessen(None);
        assert_eq!(transport.recv().await, Eingehend::Geschlossen(CloseCode::NO_STATUS));
    }

    #[tokio::test]
    async fn fehlschlaege_werden_gezaehlt() {
        let (connector, _server_rx) = MemoryConnector::new();
        connector.fehlschlagen_lassen(2);
        assert!(connector.connect(&endpoint()).await.is_err());
        assert!(connector.connect(&endpoint()).await.is_err());
        assert!(connector.connect(&endpoint()).await.is_ok());
        assert_eq!(connector.versuche(), 3);
    }

    #[tokio::test]
    async fn senden_nach_ende_der_gegenstelle_schlaegt_fehl() {
        let (connector, mut server_rx) = MemoryConnector::new();
        let transport = connector.connect(&endpoint()).await.unwrap();
        drop(server_rx.recv().await.unwrap());
        assert!(matches!(
            transport.send_binary(Bytes::new()),
            Err(TransportError::Geschlossen)
        ));
    }
}

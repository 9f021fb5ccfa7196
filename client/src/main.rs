//! Talkback Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, oeffnet Mikrofon
//! und Ausgabegeraet und startet die Duplex-Sitzung. Gesteuert wird
//! ueber stdin.
//!
//! `talkback --geraete` listet nur die Audio-Geraete und beendet sich.

mod config;
mod eingabe;
mod geraete;

use std::sync::Arc;

use anyhow::{Context, Result};
use talkback_audio::{CaptureController, CpalInput, CpalSink, StreamingPlaybackScheduler};
use talkback_core::TurnState;
use talkback_observability::{ereignisse_protokollieren, logging_initialisieren};
use talkback_session::{DuplexSession, SessionAudio, TalkResponse, WebSocketConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::ClientConfig;
use crate::eingabe::{Eingabe, HILFE};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("TALKBACK_CONFIG").unwrap_or_else(|_| "talkback.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    if std::env::args().skip(1).any(|a| a == "--geraete") {
        geraete::ausgeben();
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Talkback Client wird initialisiert"
    );

    let session_config = config.session_config()?;
    tracing::info!(endpoint = %session_config.endpoint, "Stream-Endpunkt");

    let mikrofon = CpalInput::new(config.capture_config());
    let capture = CaptureController::new(Box::new(mikrofon), config.capture_settings());

    let (lautsprecher, sink_events) =
        CpalSink::oeffnen(config.playback_config()).context("Ausgabegeraet nicht verfuegbar")?;
    tracing::info!(
        sample_rate = lautsprecher.sample_rate(),
        kanaele = lautsprecher.channels(),
        "Ausgabegeraet geoeffnet"
    );
    let scheduler =
        StreamingPlaybackScheduler::new(Box::new(lautsprecher), config.scheduler_config());

    let (handle, task) = DuplexSession::spawn(
        session_config,
        Arc::new(WebSocketConnector::new()),
        SessionAudio {
            capture,
            scheduler,
            sink_events,
        },
    );
    let protokoll = ereignisse_protokollieren(handle.events_abonnieren());

    println!("{HILFE}");

    let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
    let mut status = handle.status();
    let mut speaking = handle.speaking();

    loop {
        tokio::select! {
            zeile = zeilen.next_line() => {
                let zeile = match zeile.context("stdin nicht lesbar")? {
                    Some(z) => z,
                    // stdin geschlossen
                    None => break,
                };
                match Eingabe::parsen(&zeile) {
                    Eingabe::Taste => {
                        let antwort = if handle.snapshot().turn == TurnState::Listening {
                            handle.release().await
                        } else {
                            handle.press().await
                        };
                        if let TalkResponse::Rejected(grund) = antwort {
                            println!("! {grund}");
                        }
                    }
                    Eingabe::Verlauf => {
                        for eintrag in handle.status_log() {
                            println!("  {} {}", eintrag.zeit.format("%H:%M:%S"), eintrag.text);
                        }
                    }
                    Eingabe::Geraete => {
                        tokio::task::spawn_blocking(geraete::ausgeben)
                            .await
                            .context("Geraeteabfrage abgestuerzt")?;
                    }
                    Eingabe::Beenden => break,
                    Eingabe::Unbekannt => println!("{HILFE}"),
                }
            }
            geaendert = status.changed() => {
                if geaendert.is_err() {
                    break;
                }
                println!("[status] {}", *status.borrow_and_update());
            }
            geaendert = speaking.changed() => {
                if geaendert.is_err() {
                    break;
                }
                if *speaking.borrow_and_update() {
                    println!("[server spricht]");
                } else {
                    println!("[server fertig]");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Strg+C empfangen");
                break;
            }
        }
    }

    handle.shutdown().await;
    task.await.context("Sitzungs-Task abgestuerzt")?;
    // Das Handle haelt den Ereignis-Kanal offen
    drop(handle);
    protokoll.await.context("Ereignis-Protokoll abgestuerzt")?;

    tracing::info!("Talkback Client beendet");
    Ok(())
}

//! talkback-protocol – Wire-Formate
//!
//! Definiert alles was zwischen Client und Sprachdienst ueber die
//! Stream-Verbindung laeuft:
//! - Binaer-Frames mit linearem PCM (16 kHz hin, 24 kHz zurueck)
//! - Text-Frames mit JSON-Steuerpaketen
//! - Close-Codes und ihre Wiederverbindungs-Semantik
//! - Endpunkt-Pfade `stream/<zweck>/<sitzung>`
//! - Opus-Konfiguration fuer die lokale Aufnahme

pub mod close;
pub mod codec;
pub mod control;
pub mod endpoint;
pub mod pcm;

pub use close::{CloseCode, CloseDisposition};
pub use control::{ControlMessage, ControlPacket};
pub use endpoint::{EndpointError, StreamEndpoint};
pub use pcm::{
    decode_pcm_frame, encode_pcm_frame, DecodedPcmFrame, PcmFrameError, PLAYBACK_SAMPLE_RATE,
    UPLOAD_SAMPLE_RATE,
};

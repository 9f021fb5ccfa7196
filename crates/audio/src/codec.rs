//! Opus Encoder/Decoder Wrapper
//!
//! Kapselt audiopus und stellt eine f32-PCM basierte API bereit.
//! Die Aufnahme wird frameweise kodiert; der Decoder liefert die
//! interleaved Samples fuer die Transkodierung zurueck.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate,
};
use tracing::debug;

use crate::error::CaptureError;
use crate::error::TranscodeError;
use talkback_protocol::codec::{
    ChannelCount, OpusApplication, OpusConfig, SampleRate as ProtocolSampleRate,
};

/// Obergrenze fuer ein einzelnes Opus-Paket
const MAX_PAKET_BYTES: usize = 4000;

/// Laengster Opus-Frame in Millisekunden
const MAX_FRAME_MS: usize = 120;

/// Opus-Encoder: kodiert f32-PCM zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
    config: OpusConfig,
    frame_len: usize,
}

impl OpusEncoder {
    /// Erstellt einen neuen Encoder mit der gegebenen Konfiguration
    pub fn new(config: OpusConfig) -> Result<Self, CaptureError> {
        config
            .validieren()
            .map_err(CaptureError::UnsupportedFormat)?;

        let sample_rate = protocol_rate_to_audiopus(config.sample_rate);
        let channels = protocol_channels_to_audiopus(config.channels);
        let application = protocol_app_to_audiopus(config.application);

        let mut encoder = Encoder::new(sample_rate, channels, application)
            .map_err(|e| CaptureError::Codec(e.to_string()))?;

        encoder
            .set_bitrate(audiopus::Bitrate::BitsPerSecond(
                (config.bitrate_kbps as i32) * 1000,
            ))
            .map_err(|e| CaptureError::Codec(e.to_string()))?;

        // audiopus 0.2 erwartet u8
        encoder
            .set_complexity(config.complexity)
            .map_err(|e| CaptureError::Codec(e.to_string()))?;

        encoder
            .set_vbr(config.vbr_enabled)
            .map_err(|e| CaptureError::Codec(e.to_string()))?;

        let frame_len = config.interleaved_frame_len();

        debug!(
            "OpusEncoder erstellt: {}kbps, {:?}, {:?}, frame_len={}",
            config.bitrate_kbps, config.sample_rate, config.channels, frame_len
        );

        Ok(Self {
            encoder,
            config,
            frame_len,
        })
    }

    /// Kodiert einen interleaved PCM-Frame (f32, -1.0..1.0) zu Opus-Bytes
    ///
    /// Die Eingabe muss exakt `frame_len()` Samples lang sein.
    pub fn encode(&mut self, pcm: &[f32]) -> Result<Vec<u8>, CaptureError> {
        if pcm.len() != self.frame_len {
            return Err(CaptureError::Codec(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                self.frame_len,
                pcm.len()
            )));
        }

        let mut output = vec![0u8; MAX_PAKET_BYTES];
        let written = self
            .encoder
            .encode_float(pcm, &mut output)
            .map_err(|e| CaptureError::Codec(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }

    /// Vorlauf des Encoders in Frames pro Kanal
    ///
    /// So viele Frames stehen am Anfang der dekodierten Ausgabe vor dem
    /// eigentlichen Signal.
    pub fn vorlauf(&self) -> Result<u32, CaptureError> {
        self.encoder
            .lookahead()
            .map_err(|e| CaptureError::Codec(e.to_string()))
    }

    /// Interleaved Samples pro Frame
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn config(&self) -> &OpusConfig {
        &self.config
    }
}

/// Opus-Decoder: dekodiert Opus-Bytes zu f32-PCM
pub struct OpusDecoder {
    decoder: Decoder,
    channels: ChannelCount,
    max_len: usize,
}

impl OpusDecoder {
    /// Erstellt einen neuen Decoder
    pub fn new(sample_rate: ProtocolSampleRate, channels: ChannelCount) -> Result<Self, TranscodeError> {
        let sr = protocol_rate_to_audiopus(sample_rate);
        let ch = protocol_channels_to_audiopus(channels);

        let decoder = Decoder::new(sr, ch).map_err(|e| TranscodeError::Decode(e.to_string()))?;
        let max_len = sample_rate.hz() as usize * MAX_FRAME_MS / 1000 * channels.count() as usize;

        debug!("OpusDecoder erstellt: {:?} {:?}", sample_rate, channels);

        Ok(Self {
            decoder,
            channels,
            max_len,
        })
    }

    /// Dekodiert ein Opus-Paket zu interleaved f32-PCM
    pub fn decode(&mut self, opus_data: &[u8]) -> Result<Vec<f32>, TranscodeError> {
        let mut output = vec![0.0f32; self.max_len];
        let decoded = self
            .decoder
            .decode_float(Some(opus_data), &mut output, false)
            .map_err(|e| TranscodeError::Decode(e.to_string()))?;

        output.truncate(decoded * self.channels.count() as usize);
        Ok(output)
    }

    pub fn channels(&self) -> ChannelCount {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Konvertierungs-Hilfsfunktionen
// ---------------------------------------------------------------------------

fn protocol_rate_to_audiopus(rate: ProtocolSampleRate) -> SampleRate {
    match rate {
        ProtocolSampleRate::Hz8000 => SampleRate::Hz8000,
        ProtocolSampleRate::Hz12000 => SampleRate::Hz12000,
        ProtocolSampleRate::Hz16000 => SampleRate::Hz16000,
        ProtocolSampleRate::Hz24000 => SampleRate::Hz24000,
        ProtocolSampleRate::Hz48000 => SampleRate::Hz48000,
    }
}

fn protocol_channels_to_audiopus(ch: ChannelCount) -> Channels {
    match ch {
        ChannelCount::Mono => Channels::Mono,
        ChannelCount::Stereo => Channels::Stereo,
    }
}

fn protocol_app_to_audiopus(app: OpusApplication) -> Application {
    match app {
        OpusApplication::Voip => Application::Voip,
        OpusApplication::Audio => Application::Audio,
        OpusApplication::RestrictedLowdelay => Application::LowDelay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talkback_protocol::codec::{AudioPreset, SampleRate as PSR};

    #[test]
    fn encoder_konfiguration_speech() {
        let enc = OpusEncoder::new(AudioPreset::Speech.config()).unwrap();
        assert_eq!(enc.config().bitrate_kbps, 32);
        // 20ms bei 16kHz = 320 Samples
        assert_eq!(enc.frame_len(), 320);
    }

    #[test]
    fn encoder_stereo_frame_len() {
        let config = OpusConfig::fuer_aufnahme(PSR::Hz48000, ChannelCount::Stereo);
        let enc = OpusEncoder::new(config).unwrap();
        assert_eq!(enc.frame_len(), 1920);
    }

    #[test]
    fn encoder_falsche_frame_laenge_fehler() {
        let mut enc = OpusEncoder::new(AudioPreset::Speech.config()).unwrap();
        assert!(enc.encode(&vec![0.0f32; 100]).is_err());
    }

    #[test]
    fn encoder_ungueltige_konfiguration() {
        let mut config = AudioPreset::Speech.config();
        config.bitrate_kbps = 5;
        assert!(matches!(
            OpusEncoder::new(config),
            Err(CaptureError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn ein_frame_hin_und_zurueck() {
        let config = AudioPreset::Wideband.config();
        let mut enc = OpusEncoder::new(config.clone()).unwrap();
        let mut dec = OpusDecoder::new(config.sample_rate, config.channels).unwrap();

        let n = enc.frame_len();
        let pcm_in: Vec<f32> = (0..n)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 48000.0).sin() * 0.5)
            .collect();

        let encoded = enc.encode(&pcm_in).expect("Encoding sollte funktionieren");
        assert!(!encoded.is_empty());

        let decoded = dec.decode(&encoded).expect("Decoding sollte funktionieren");
        assert_eq!(decoded.len(), n);
    }

    #[test]
    fn muell_ist_dekodierfehler() {
        let mut dec = OpusDecoder::new(PSR::Hz48000, ChannelCount::Mono).unwrap();
        // TOC-Byte mit Code 3 und fehlender Frame-Anzahl
        assert!(dec.decode(&[0xff]).is_err());
    }
}

//! Codec-Konfiguration fuer die lokale Aufnahme
//!
//! Die Aufnahme wird waehrend die Sprechtaste gehalten wird als Opus
//! kodiert und erst nach dem Loslassen zu linearem PCM transkodiert.
//! Hier liegen die Opus-Konfigurationstypen und die Presets dafuer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Opus-Konfiguration
// ---------------------------------------------------------------------------

/// Von Opus unterstuetzte Abtastraten
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRate {
    /// 8 kHz – Schmalband
    Hz8000 = 8000,
    /// 12 kHz – Mittelband
    Hz12000 = 12000,
    /// 16 kHz – Breitband (Upload-Rate)
    Hz16000 = 16000,
    /// 24 kHz – Superbreitband (Wiedergabe-Rate)
    Hz24000 = 24000,
    /// 48 kHz – Vollband (typische Geraeterate)
    #[default]
    Hz48000 = 48000,
}

impl SampleRate {
    /// Wandelt eine Rate in Hz in die Opus-Rate um
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8000 => Some(Self::Hz8000),
            12000 => Some(Self::Hz12000),
            16000 => Some(Self::Hz16000),
            24000 => Some(Self::Hz24000),
            48000 => Some(Self::Hz48000),
            _ => None,
        }
    }

    pub fn hz(&self) -> u32 {
        *self as u32
    }
}

/// Anzahl der Audio-Kanaele
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCount {
    #[default]
    Mono = 1,
    Stereo = 2,
}

impl ChannelCount {
    pub fn from_count(count: u16) -> Option<Self> {
        match count {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            _ => None,
        }
    }

    pub fn count(&self) -> u16 {
        *self as u16
    }
}

/// Opus-Anwendungsmodus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpusApplication {
    /// Optimiert fuer Sprachverstaendlichkeit
    #[default]
    Voip,
    /// Optimiert fuer allgemeine Audio-Qualitaet
    Audio,
    /// Minimale Verarbeitungsverzoegerung
    RestrictedLowdelay,
}

/// Frame-Groesse in Zehntelmillisekunden
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSizeMs {
    Ms10 = 100,
    /// 20 ms – Standard
    #[default]
    Ms20 = 200,
    Ms40 = 400,
    Ms60 = 600,
}

impl FrameSizeMs {
    /// Berechnet die Anzahl der Samples pro Kanal und Frame
    pub fn samples_per_frame(&self, sample_rate: SampleRate) -> u32 {
        // ms_x10 / 10 * rate / 1000 = ms_x10 * rate / 10000
        (*self as u32) * sample_rate.hz() / 10000
    }
}

/// Vollstaendige Opus-Codec-Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpusConfig {
    /// Ziel-Bitrate in kbps (6–510)
    pub bitrate_kbps: u16,
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    pub frame_size: FrameSizeMs,
    pub application: OpusApplication,
    /// Komplexitaet (0–10)
    pub complexity: u8,
    pub vbr_enabled: bool,
}

impl OpusConfig {
    /// Validiert die Konfiguration
    pub fn validieren(&self) -> Result<(), String> {
        if self.bitrate_kbps < 6 || self.bitrate_kbps > 510 {
            return Err(format!(
                "Bitrate muss zwischen 6 und 510 kbps liegen (war: {})",
                self.bitrate_kbps
            ));
        }
        if self.complexity > 10 {
            return Err(format!(
                "Komplexitaet muss zwischen 0 und 10 liegen (war: {})",
                self.complexity
            ));
        }
        Ok(())
    }

    /// Samples pro Frame ueber alle Kanaele (interleaved)
    pub fn interleaved_frame_len(&self) -> usize {
        self.frame_size.samples_per_frame(self.sample_rate) as usize
            * self.channels.count() as usize
    }

    /// Aufnahme-Konfiguration fuer eine konkrete Geraeterate
    ///
    /// Uebernimmt Bitrate und Modus des zur Rate passenden Presets, Rate
    /// und Kanalzahl kommen vom Geraet.
    pub fn fuer_aufnahme(sample_rate: SampleRate, channels: ChannelCount) -> Self {
        let basis = AudioPreset::fuer_rate(sample_rate).config();
        let bitrate_kbps = match channels {
            ChannelCount::Mono => basis.bitrate_kbps,
            ChannelCount::Stereo => basis.bitrate_kbps * 2,
        };
        Self {
            bitrate_kbps,
            sample_rate,
            channels,
            ..basis
        }
    }
}

// ---------------------------------------------------------------------------
// Audio-Presets
// ---------------------------------------------------------------------------

/// Vordefinierte Aufnahme-Konfigurationen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPreset {
    /// Sprache in Upload-Qualitaet
    Speech,
    /// Sprache bei voller Geraeterate
    Wideband,
}

impl AudioPreset {
    /// Preset fuer eine Geraeterate: ab 24 kHz Breitband
    pub fn fuer_rate(rate: SampleRate) -> Self {
        if rate.hz() >= SampleRate::Hz24000.hz() {
            AudioPreset::Wideband
        } else {
            AudioPreset::Speech
        }
    }

    /// Gibt die vordefinierte `OpusConfig` fuer dieses Preset zurueck
    pub fn config(&self) -> OpusConfig {
        match self {
            AudioPreset::Speech => OpusConfig {
                bitrate_kbps: 32,
                sample_rate: SampleRate::Hz16000,
                channels: ChannelCount::Mono,
                frame_size: FrameSizeMs::Ms20,
                application: OpusApplication::Voip,
                complexity: 8,
                vbr_enabled: true,
            },
            AudioPreset::Wideband => OpusConfig {
                bitrate_kbps: 64,
                sample_rate: SampleRate::Hz48000,
                channels: ChannelCount::Mono,
                frame_size: FrameSizeMs::Ms20,
                application: OpusApplication::Voip,
                complexity: 9,
                vbr_enabled: true,
            },
        }
    }
}

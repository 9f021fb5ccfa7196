//! Audio-Geraete auflisten und auswaehlen
//!
//! Geraete werden ueber einen Teil ihres Namens ausgewaehlt; ohne
//! Vorgabe gilt das Standardgeraet des cpal-Hosts.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// Richtung eines Geraets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Richtung {
    Eingabe,
    Ausgabe,
}

/// Ein Audio-Geraet mit seinen Eigenschaften
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub name: String,
    pub richtung: Richtung,
    /// Unterstuetzte Raten aus den fuer Talkback relevanten
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
    pub ist_standard: bool,
}

const RELEVANTE_RATEN: [u32; 6] = [8000, 12000, 16000, 24000, 44100, 48000];

/// Listet alle Geraete einer Richtung auf
pub fn list_devices(richtung: Richtung) -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let standard_name = standard_geraet(&host, richtung).and_then(|d| d.name().ok());

    let devices: Vec<Device> = match richtung {
        Richtung::Eingabe => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        Richtung::Ausgabe => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    }
    .map_err(|e| AudioError::Konfiguration(e.to_string()))?;

    let mut result = Vec::new();
    for device in devices {
        match beschreiben(&device, richtung, standard_name.as_deref()) {
            Ok(ad) => result.push(ad),
            Err(e) => warn!(?richtung, "Geraet konnte nicht gelesen werden: {}", e),
        }
    }
    debug!(?richtung, anzahl = result.len(), "Geraete aufgelistet");
    Ok(result)
}

/// Laedt ein Eingabegeraet anhand eines Namensteils
pub fn load_cpal_input_device(name: Option<&str>) -> AudioResult<Device> {
    load_cpal_device(name, Richtung::Eingabe)
}

/// Laedt ein Ausgabegeraet anhand eines Namensteils
pub fn load_cpal_output_device(name: Option<&str>) -> AudioResult<Device> {
    load_cpal_device(name, Richtung::Ausgabe)
}

fn load_cpal_device(name: Option<&str>, richtung: Richtung) -> AudioResult<Device> {
    let host = cpal::default_host();
    let Some(gesucht) = name else {
        return standard_geraet(&host, richtung).ok_or_else(|| {
            AudioError::GeraetNichtGefunden(format!("kein Standardgeraet ({richtung:?})"))
        });
    };

    let devices: Vec<Device> = match richtung {
        Richtung::Eingabe => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        Richtung::Ausgabe => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    }
    .map_err(|e| AudioError::Konfiguration(e.to_string()))?;

    devices
        .into_iter()
        .find(|d| d.name().map(|n| name_passt(&n, gesucht)).unwrap_or(false))
        .ok_or_else(|| AudioError::GeraetNichtGefunden(gesucht.to_string()))
}

fn standard_geraet(host: &cpal::Host, richtung: Richtung) -> Option<Device> {
    match richtung {
        Richtung::Eingabe => host.default_input_device(),
        Richtung::Ausgabe => host.default_output_device(),
    }
}

/// Namensvergleich ohne Beachtung der Gross-/Kleinschreibung
pub fn name_passt(geraetename: &str, gesucht: &str) -> bool {
    geraetename
        .to_lowercase()
        .contains(&gesucht.trim().to_lowercase())
}

fn beschreiben(
    device: &Device,
    richtung: Richtung,
    standard_name: Option<&str>,
) -> AudioResult<AudioDevice> {
    let name = device
        .name()
        .map_err(|e| AudioError::Konfiguration(e.to_string()))?;

    let bereiche: Vec<(u32, u32, u16)> = match richtung {
        Richtung::Eingabe => device.supported_input_configs().map(|cfgs| {
            cfgs.map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
                .collect::<Vec<_>>()
        }),
        Richtung::Ausgabe => device.supported_output_configs().map(|cfgs| {
            cfgs.map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
                .collect::<Vec<_>>()
        }),
    }
    .map_err(|e| AudioError::Konfiguration(e.to_string()))?;

    let (sample_rates, max_channels) = raten_und_kanaele(&bereiche);

    Ok(AudioDevice {
        ist_standard: standard_name == Some(name.as_str()),
        name,
        richtung,
        sample_rates,
        max_channels,
    })
}

/// Verdichtet Konfigurationsbereiche `(min, max, kanaele)`
fn raten_und_kanaele(bereiche: &[(u32, u32, u16)]) -> (Vec<u32>, u16) {
    let mut raten: Vec<u32> = RELEVANTE_RATEN
        .iter()
        .copied()
        .filter(|r| bereiche.iter().any(|(min, max, _)| min <= r && r <= max))
        .collect();
    raten.sort_unstable();
    let kanaele = bereiche.iter().map(|(_, _, k)| *k).max().unwrap_or(0);
    (raten, kanaele)
}

//! Ausgabe der verfuegbaren Audio-Geraete

use talkback_audio::{list_devices, AudioDevice, Richtung};

/// Eine Zeile pro Geraet, das Standardgeraet mit Stern
pub fn zeile(geraet: &AudioDevice) -> String {
    let raten = if geraet.sample_rates.is_empty() {
        "-".to_string()
    } else {
        geraet
            .sample_rates
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("/")
    };
    format!(
        "{} {} ({} Hz, bis {} Kanaele)",
        if geraet.ist_standard { "*" } else { " " },
        geraet.name,
        raten,
        geraet.max_channels
    )
}

/// Listet Ein- und Ausgabegeraete auf stdout
///
/// Blockiert, solange der cpal-Host die Geraete abfragt.
pub fn ausgeben() {
    for (titel, richtung) in [
        ("Eingabegeraete", Richtung::Eingabe),
        ("Ausgabegeraete", Richtung::Ausgabe),
    ] {
        println!("{titel}:");
        match list_devices(richtung) {
            Ok(liste) if liste.is_empty() => println!("    (keine)"),
            Ok(liste) => {
                for geraet in &liste {
                    println!("  {}", zeile(geraet));
                }
            }
            Err(e) => {
                tracing::warn!(fehler = %e, ?richtung, "Geraeteliste nicht abrufbar");
                println!("    (nicht abrufbar: {e})");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geraet(ist_standard: bool, sample_rates: Vec<u32>) -> AudioDevice {
        AudioDevice {
            name: "USB Headset".into(),
            richtung: Richtung::Ausgabe,
            sample_rates,
            max_channels: 2,
            ist_standard,
        }
    }

    #[test]
    fn standardgeraet_mit_stern() {
        assert_eq!(
            zeile(&geraet(true, vec![16000, 48000])),
            "* USB Headset (16000/48000 Hz, bis 2 Kanaele)"
        );
    }

    #[test]
    fn ohne_passende_rate() {
        assert_eq!(
            zeile(&geraet(false, vec![])),
            "  USB Headset (- Hz, bis 2 Kanaele)"
        );
    }
}

//! Format audio cible négocié avec le call leg

use std::str::FromStr;
use std::time::Duration;

/// Encodage des échantillons produits par le transcodage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// G.711 µ-law, 1 octet par échantillon.
    Mulaw,
    /// G.711 A-law, 1 octet par échantillon.
    Alaw,
    /// PCM signé 16 bits little-endian, 2 octets par échantillon.
    PcmS16Le,
}

impl SampleEncoding {
    /// Nom du muxer FFmpeg correspondant (`-f`).
    pub fn ffmpeg_format(&self) -> &'static str {
        match self {
            SampleEncoding::Mulaw => "mulaw",
            SampleEncoding::Alaw => "alaw",
            SampleEncoding::PcmS16Le => "s16le",
        }
    }

    /// Taille d'un échantillon en octets.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleEncoding::Mulaw | SampleEncoding::Alaw => 1,
            SampleEncoding::PcmS16Le => 2,
        }
    }
}

/// Erreur de parsing d'un nom d'encodage.
#[derive(Debug, thiserror::Error)]
#[error("unknown sample encoding: {0}")]
pub struct ParseEncodingError(String);

impl FromStr for SampleEncoding {
    type Err = ParseEncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mulaw" | "pcm_mulaw" => Ok(SampleEncoding::Mulaw),
            "alaw" | "pcm_alaw" => Ok(SampleEncoding::Alaw),
            "s16le" | "pcm_s16le" => Ok(SampleEncoding::PcmS16Le),
            other => Err(ParseEncodingError(other.to_string())),
        }
    }
}

/// Format de sortie du transcodage.
///
/// Doit correspondre EXACTEMENT au format que le pacer découpe en frames :
/// un décalage produit de l'audio distordu, c'est un invariant de
/// configuration, pas une vérification à l'exécution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormat {
    /// Fréquence d'échantillonnage en Hz.
    pub sample_rate: u32,
    /// Nombre de canaux.
    pub channels: u8,
    /// Encodage des échantillons.
    pub encoding: SampleEncoding,
}

impl TargetFormat {
    /// Format téléphonique classique : G.711 µ-law, 8 kHz, mono.
    pub fn telephony() -> Self {
        Self {
            sample_rate: 8000,
            channels: 1,
            encoding: SampleEncoding::Mulaw,
        }
    }

    /// Octets produits par seconde d'audio.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.encoding.bytes_per_sample() * self.channels as usize
    }

    /// Taille d'une frame couvrant `frame_duration` d'audio.
    pub fn bytes_per_frame(&self, frame_duration: Duration) -> usize {
        let samples = self.sample_rate as u128 * frame_duration.as_millis() / 1000;
        samples as usize * self.encoding.bytes_per_sample() * self.channels as usize
    }
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self::telephony()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telephony_frame_is_160_bytes_at_20ms() {
        let format = TargetFormat::telephony();
        assert_eq!(format.bytes_per_frame(Duration::from_millis(20)), 160);
        assert_eq!(format.bytes_per_second(), 8000);
    }

    #[test]
    fn test_pcm_frame_accounts_for_sample_width_and_channels() {
        let format = TargetFormat {
            sample_rate: 16000,
            channels: 2,
            encoding: SampleEncoding::PcmS16Le,
        };
        // 16000 Hz * 20 ms = 320 échantillons * 2 octets * 2 canaux
        assert_eq!(format.bytes_per_frame(Duration::from_millis(20)), 1280);
    }

    #[test]
    fn test_encoding_parses_ffmpeg_style_names() {
        assert_eq!(
            "pcm_mulaw".parse::<SampleEncoding>().unwrap(),
            SampleEncoding::Mulaw
        );
        assert_eq!(
            "s16le".parse::<SampleEncoding>().unwrap(),
            SampleEncoding::PcmS16Le
        );
        assert!("opus".parse::<SampleEncoding>().is_err());
    }
}

//! Sortie d'un transcodage

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::format::TargetFormat;

/// Audio brut produit par un transcodage, adossé à un fichier temporaire.
///
/// Le fichier appartient à cette valeur : il est supprimé quand elle est
/// abandonnée, quel que soit le chemin de sortie de l'étape qui l'a créée.
#[derive(Debug)]
pub struct TranscodedAudio {
    file: NamedTempFile,
    len: u64,
}

impl TranscodedAudio {
    pub(crate) fn new(file: NamedTempFile, len: u64) -> Self {
        Self { file, len }
    }

    /// Construit une sortie à partir d'octets en mémoire.
    ///
    /// Utilisé par les doubles de test et les transcodeurs in-process.
    pub fn from_bytes(workdir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("seg-")
            .suffix(".raw")
            .tempfile_in(workdir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            file,
            len: bytes.len() as u64,
        })
    }

    /// Taille de l'audio brut en octets.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Chemin du fichier brut (valide tant que la valeur vit).
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Durée d'audio représentée, au format donné.
    pub fn duration(&self, format: &TargetFormat) -> Duration {
        let bps = format.bytes_per_second() as u64;
        if bps == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.len * 1000 / bps)
    }

    /// Ouvre un lecteur asynchrone sur l'audio brut.
    pub async fn reader(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::open(self.file.path()).await
    }
}

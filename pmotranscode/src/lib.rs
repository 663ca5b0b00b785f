//! Transcodage de segments HLS vers de l'audio brut téléphonique
//!
//! Cette crate fournit la capacité de transcodage du pont HLS/téléphonie :
//! un segment (adressé par URI) entre, un flux d'échantillons bruts au
//! format du call leg sort. Le décodage réel est délégué à un FFmpeg
//! externe, derrière le trait [`Transcoder`] pour rester substituable
//! (décodeur in-process, double de test...).
//!
//! # Cycle de vie des artefacts
//!
//! Chaque transcodage travaille dans un répertoire fourni par l'appelant
//! (le workdir de la session). Le segment téléchargé est supprimé sur
//! TOUS les chemins de sortie, succès comme échec ; la sortie brute
//! appartient au [`TranscodedAudio`] retourné et disparaît avec lui.
//!
//! # Exemple
//!
//! ```no_run
//! use pmotranscode::{FfmpegTranscoder, TargetFormat, Transcoder};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transcoder = FfmpegTranscoder::new();
//!     transcoder.ensure_available().await?;
//!
//!     let workdir = tempfile::tempdir()?;
//!     let segment = Url::parse("https://example.com/live/seg42.ts")?;
//!     let audio = transcoder
//!         .transcode(&segment, &TargetFormat::telephony(), workdir.path())
//!         .await?;
//!     println!("{} octets d'audio brut", audio.len());
//!     Ok(())
//! }
//! ```

mod audio;
mod error;
mod ffmpeg;
mod format;

use std::path::Path;

use async_trait::async_trait;
use url::Url;

pub use audio::TranscodedAudio;
pub use error::TranscodeError;
pub use ffmpeg::{FfmpegTranscoder, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_TRANSCODE_TIMEOUT_SECS};
pub use format::{ParseEncodingError, SampleEncoding, TargetFormat};

/// Capacité de transcodage d'un segment vers de l'audio brut.
///
/// L'implémentation doit borner sa durée d'exécution : sur dépassement,
/// tout sous-processus lancé est tué et attendu avant de retourner.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode le segment `source` au format `format`.
    ///
    /// Les fichiers intermédiaires sont créés sous `workdir` et n'y
    /// survivent pas à l'appel (hors sortie, portée par le retour).
    async fn transcode(
        &self,
        source: &Url,
        format: &TargetFormat,
        workdir: &Path,
    ) -> Result<TranscodedAudio, TranscodeError>;
}

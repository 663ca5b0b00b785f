//! Erreurs du transcodage

use std::process::ExitStatus;
use std::time::Duration;

/// Erreurs rapportées par un [`crate::Transcoder`].
///
/// Toutes signifient « segment abandonné » pour la boucle de streaming :
/// aucune n'est fatale à la session.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// Téléchargement du segment échoué (réseau, statut HTTP).
    #[error("segment download failed: {0}")]
    Download(#[from] reqwest::Error),

    /// Erreur d'E/S sur un fichier intermédiaire.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Le binaire de transcodage n'a pas pu être lancé.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Le transcodeur a terminé en erreur.
    #[error("transcoder exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },

    /// Délai dépassé ; le sous-processus a été tué et attendu.
    #[error("transcode timed out after {0:?}")]
    Timeout(Duration),

    /// Le binaire de transcodage est absent ou inutilisable.
    #[error("transcoder unavailable: {0}")]
    Unavailable(String),
}

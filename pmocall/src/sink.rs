use async_trait::async_trait;

/// Erreurs rapportées par un [`CallSink`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// L'appel n'accepte plus d'audio (raccroché ou invalide).
    ///
    /// Équivalent à `is_live() == false` : l'appelant doit arrêter la
    /// diffusion, pas réessayer.
    #[error("call is no longer accepting audio")]
    NotLive,

    /// L'écriture a échoué pour une autre raison (transport, disque...).
    ///
    /// Traité comme une disparition du sink par le pipeline.
    #[error("audio write failed: {0}")]
    Write(String),
}

/// Point d'écriture audio d'un appel actif.
///
/// Implémenté par la couche de signalisation (un leg SIP, un fichier de
/// diagnostic, un sink scripté de test). Toutes les méthodes prennent
/// `&self` : un sink est partageable entre la boucle de diffusion et un
/// superviseur qui peut raccrocher.
#[async_trait]
pub trait CallSink: Send + Sync {
    /// L'appel accepte-t-il encore de l'audio ?
    ///
    /// Interrogeable à haute fréquence ; `false` impose un arrêt immédiat
    /// de la diffusion.
    fn is_live(&self) -> bool;

    /// Écrit exactement une frame audio au format négocié.
    async fn write_audio(&self, frame: &[u8]) -> Result<(), SinkError>;

    /// Raccroche l'appel. Idempotent.
    async fn hang_up(&self);
}

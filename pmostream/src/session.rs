//! Session de streaming : la machine à états d'un appel
//!
//! Une [`StreamingSession`] pilote, sur une seule task, le cycle
//! complet : rechargement de playlist, sélection, transcodage,
//! diffusion, et comptabilité de l'historique. Elle réagit à la
//! vivacité du call leg (vérifiée avant chaque transition) et aux
//! erreurs de ses collaborateurs.
//!
//! # États
//!
//! ```text
//! RELOADING → SELECTING → TRANSCODING → DELIVERING ─┐
//!     ↑           │            │            │       │
//!     └───────────┴── backoff ─┴────────────┘       │
//!                                                   ↓
//!                                          ENDED / FAILED
//! ```
//!
//! - une playlist VOD épuisée termine proprement (ENDED, ce n'est pas
//!   une erreur) ; si l'appel est encore ouvert à ce moment, la session
//!   raccroche activement plutôt que de laisser du silence ;
//! - un échec de transcodage abandonne le segment (marqué joué pour ne
//!   pas le retenter en boucle) et la session continue ;
//! - la disparition du sink est fatale et immédiate, y compris au
//!   milieu d'un transcodage ou d'une diffusion ;
//! - toute erreur inclassable passe par FAILED avec le même nettoyage.
//!
//! # Nettoyage
//!
//! Les artefacts disque d'un segment vivent dans le répertoire de
//! travail de la session (un `TempDir`) et sont détruits avec elle,
//! quel que soit le chemin de sortie.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

use pmocall::CallSink;
use pmohls::{PlaylistFetcher, PlaylistSnapshot, SegmentRef};
use pmotranscode::{TargetFormat, TranscodedAudio, Transcoder};

use crate::history::{PlayedHistory, DEFAULT_HISTORY_CAPACITY};
use crate::pacer::{deliver, DeliveryOutcome};
use crate::selector::{select, Selection, DEFAULT_LIVE_WINDOW};

/// Intervalle par défaut entre deux rechargements d'une playlist live
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 5;

/// Backoff par défaut après un échec de transcodage
const DEFAULT_TRANSCODE_BACKOFF: Duration = Duration::from_millis(500);

/// Réglages d'une session de streaming.
///
/// Tous proviennent de la configuration externe ; rien n'est codé en
/// dur dans la boucle. `frame_size` doit correspondre au format produit
/// par le transcodeur (invariant de configuration).
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Intervalle de rechargement de la playlist.
    pub reload_interval: Duration,
    /// Taille de la fenêtre de sélection live.
    pub live_window: usize,
    /// Capacité de l'historique des segments joués.
    pub history_capacity: usize,
    /// Durée d'audio d'une frame.
    pub frame_duration: Duration,
    /// Taille d'une frame en octets.
    pub frame_size: usize,
    /// Pause après un échec de transcodage.
    pub transcode_backoff: Duration,
    /// Format audio demandé au transcodeur.
    pub target_format: TargetFormat,
}

impl SessionSettings {
    /// Réglages dérivés d'un format cible et d'une durée de frame.
    pub fn for_format(target_format: TargetFormat, frame_duration: Duration) -> Self {
        Self {
            reload_interval: Duration::from_secs(DEFAULT_RELOAD_INTERVAL_SECS),
            live_window: DEFAULT_LIVE_WINDOW,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            frame_duration,
            frame_size: target_format.bytes_per_frame(frame_duration),
            transcode_backoff: DEFAULT_TRANSCODE_BACKOFF,
            target_format,
        }
    }
}

impl Default for SessionSettings {
    /// Téléphonie classique : µ-law 8 kHz mono en frames de 20 ms.
    fn default() -> Self {
        Self::for_format(TargetFormat::telephony(), Duration::from_millis(20))
    }
}

/// Erreurs inclassables, fatales à la session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Impossible de créer le répertoire de travail.
    #[error("failed to create session working directory: {0}")]
    Workdir(std::io::Error),

    /// L'audio transcodé n'a pas pu être rouvert pour diffusion.
    #[error("failed to open transcoded audio: {0}")]
    OpenAudio(std::io::Error),

    /// Erreur de lecture du flux décodé pendant la diffusion.
    #[error("delivery read failed: {0}")]
    Delivery(std::io::Error),

    /// Incohérence interne de la machine à états.
    #[error("internal state error: {0}")]
    Internal(&'static str),
}

/// Issue d'une session.
#[derive(Debug)]
pub enum SessionEnd {
    /// Playlist finie entièrement diffusée.
    Completed,
    /// Le call leg a disparu (raccroché, état invalide).
    SinkGone,
    /// Erreur inclassable ; le nettoyage a eu lieu malgré tout.
    Failed(SessionError),
}

impl SessionEnd {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionEnd::Completed)
    }

    pub fn is_sink_gone(&self) -> bool {
        matches!(self, SessionEnd::SinkGone)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionEnd::Failed(_))
    }
}

/// États internes de la boucle.
enum State {
    Reloading,
    Selecting,
    Transcoding(SegmentRef),
    Delivering(SegmentRef, TranscodedAudio),
    Finished(SessionEnd),
}

/// Une session de streaming liée à un appel et une playlist.
///
/// Possède exclusivement son historique, son curseur VOD et son
/// répertoire de travail ; rien n'est partagé entre appels concurrents.
pub struct StreamingSession<F, T, S> {
    id: Uuid,
    playlist_url: Url,
    fetcher: F,
    transcoder: T,
    sink: S,
    settings: SessionSettings,
    history: PlayedHistory,
    cursor: usize,
    snapshot: Option<PlaylistSnapshot>,
    last_reload: Option<Instant>,
    workdir: TempDir,
}

impl<F, T, S> StreamingSession<F, T, S>
where
    F: PlaylistFetcher,
    T: Transcoder,
    S: CallSink,
{
    /// Crée une session prête à tourner.
    pub fn new(
        playlist_url: Url,
        fetcher: F,
        transcoder: T,
        sink: S,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let workdir = tempfile::Builder::new()
            .prefix("pmophone-session-")
            .tempdir()
            .map_err(SessionError::Workdir)?;

        Ok(Self {
            id: Uuid::new_v4(),
            playlist_url,
            fetcher,
            transcoder,
            sink,
            history: PlayedHistory::new(settings.history_capacity),
            settings,
            cursor: 0,
            snapshot: None,
            last_reload: None,
            workdir,
        })
    }

    /// Identifiant de session (porté par le span de tracing).
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Répertoire de travail des artefacts de segment.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Déroule la session jusqu'à son terme.
    ///
    /// Consomme la session : le répertoire de travail est balayé au
    /// retour, quel que soit le chemin de sortie.
    pub async fn run(mut self) -> SessionEnd {
        let span = tracing::info_span!("session", id = %self.id, playlist = %self.playlist_url);
        async move {
            info!("streaming session started");
            let end = match self.drive().await {
                Ok(end) => end,
                Err(e) => SessionEnd::Failed(e),
            };
            self.finish(&end).await;
            end
        }
        .instrument(span)
        .await
    }

    /// Boucle de la machine à états.
    ///
    /// La vivacité du sink est vérifiée avant CHAQUE transition : un
    /// sink mort force la fin immédiate, quel que soit l'état courant.
    async fn drive(&mut self) -> Result<SessionEnd, SessionError> {
        let mut state = State::Reloading;
        loop {
            if !self.sink.is_live() {
                info!("call leg no longer live, ending session");
                return Ok(SessionEnd::SinkGone);
            }
            state = match state {
                State::Reloading => self.reload().await,
                State::Selecting => self.select_next().await?,
                State::Transcoding(segment) => self.transcode(segment).await,
                State::Delivering(segment, audio) => self.deliver_segment(segment, audio).await?,
                State::Finished(end) => return Ok(end),
            };
        }
    }

    /// Recharge la playlist si l'intervalle est écoulé (ou au premier
    /// tour) ; un échec de fetch est transitoire et se retente après
    /// l'intervalle complet.
    async fn reload(&mut self) -> State {
        let due = match (&self.snapshot, self.last_reload) {
            (None, _) | (_, None) => true,
            (Some(_), Some(at)) => at.elapsed() >= self.settings.reload_interval,
        };

        if due {
            let snapshot = self.fetcher.fetch(&self.playlist_url).await;
            if snapshot.is_empty() {
                warn!(
                    retry_in = ?self.settings.reload_interval,
                    "playlist unavailable, will retry"
                );
                sleep(self.settings.reload_interval).await;
                return State::Reloading;
            }
            debug!(
                segments = snapshot.len(),
                finite = snapshot.is_finite,
                "playlist reloaded"
            );
            self.snapshot = Some(snapshot);
            self.last_reload = Some(Instant::now());
        }

        State::Selecting
    }

    async fn select_next(&mut self) -> Result<State, SessionError> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(SessionError::Internal("selecting without a snapshot"))?;

        match select(snapshot, &self.history, self.cursor, self.settings.live_window) {
            Selection::Next { segment, cursor } => {
                self.cursor = cursor;
                info!(uri = %segment.uri, sequence = ?segment.sequence, "segment selected");
                Ok(State::Transcoding(segment))
            }
            Selection::CaughtUp => {
                let backoff = self.settings.reload_interval / 2;
                debug!(?backoff, "caught up with the live playlist");
                sleep(backoff).await;
                Ok(State::Reloading)
            }
            Selection::Exhausted => {
                info!("finite playlist fully delivered");
                Ok(State::Finished(SessionEnd::Completed))
            }
        }
    }

    /// Transcode le segment, en surveillant la vivacité du sink pendant
    /// l'attente : un raccroché en plein transcodage abandonne le
    /// processus (tué par `kill_on_drop`) sans attendre son délai.
    async fn transcode(&mut self, segment: SegmentRef) -> State {
        let result = tokio::select! {
            result = self.transcoder.transcode(
                &segment.uri,
                &self.settings.target_format,
                self.workdir.path(),
            ) => Some(result),
            _ = sink_gone(&self.sink, self.settings.frame_duration) => None,
        };

        match result {
            None => {
                info!(uri = %segment.uri, "call leg hung up during transcode");
                State::Finished(SessionEnd::SinkGone)
            }
            Some(Ok(audio)) => {
                debug!(uri = %segment.uri, bytes = audio.len(), "segment transcoded");
                State::Delivering(segment, audio)
            }
            Some(Err(e)) => {
                warn!(uri = %segment.uri, error = %e, "transcode failed, abandoning segment");
                // Marqué joué quand même : un segment durablement cassé
                // ne doit pas être retenté en boucle.
                self.history.insert(segment.uri_str());
                sleep(self.settings.transcode_backoff).await;
                State::Selecting
            }
        }
    }

    async fn deliver_segment(
        &mut self,
        segment: SegmentRef,
        audio: TranscodedAudio,
    ) -> Result<State, SessionError> {
        debug!(
            uri = %segment.uri,
            duration = ?audio.duration(&self.settings.target_format),
            "delivering segment"
        );

        let mut reader = audio.reader().await.map_err(SessionError::OpenAudio)?;
        let outcome = deliver(
            &mut reader,
            self.settings.frame_size,
            self.settings.frame_duration,
            &self.sink,
        )
        .await
        .map_err(SessionError::Delivery)?;

        // `audio` meurt à la fin de ce bloc : le fichier brut disparaît.
        match outcome {
            DeliveryOutcome::SegmentComplete => {
                self.history.insert(segment.uri_str());
                debug!(uri = %segment.uri, "segment delivered");
                Ok(State::Reloading)
            }
            DeliveryOutcome::SinkGone => {
                info!(uri = %segment.uri, "call leg hung up during delivery");
                Ok(State::Finished(SessionEnd::SinkGone))
            }
        }
    }

    /// Épilogue commun à toutes les fins de session.
    async fn finish(&self, end: &SessionEnd) {
        if self.sink.is_live() {
            // Fin de flux alors que l'appel est encore ouvert : on
            // raccroche plutôt que de laisser l'appelant dans le
            // silence.
            warn!("session ending while the call is still live, hanging up");
            self.sink.hang_up().await;
        }
        match end {
            SessionEnd::Completed => info!("session completed"),
            SessionEnd::SinkGone => info!("session ended, call leg gone"),
            SessionEnd::Failed(e) => error!(error = %e, "session failed"),
        }
    }
}

/// Se résout quand le sink cesse d'être vivant, en l'interrogeant à
/// période bornée (une frame).
async fn sink_gone<S: CallSink + ?Sized>(sink: &S, poll: Duration) {
    while sink.is_live() {
        sleep(poll).await;
    }
}

//! Cœur du pont HLS → téléphonie : sélection et diffusion temps réel
//!
//! Cette crate contient la boucle de streaming d'une session d'appel :
//! recharger la playlist, choisir le prochain segment non joué, le faire
//! transcoder, puis écrire l'audio brut vers le call leg au rythme du
//! temps réel, jusqu'à la fin de l'appel ou de la playlist.
//!
//! # Architecture
//!
//! ```text
//! StreamingSession (machine à états, une task par appel)
//!     ├── PlaylistFetcher  → PlaylistSnapshot      (pmohls)
//!     ├── select()         → prochain SegmentRef   (fenêtre live / curseur VOD)
//!     ├── Transcoder       → TranscodedAudio       (pmotranscode)
//!     └── deliver()        → frames vers CallSink  (pmocall)
//! ```
//!
//! La session détient l'historique des segments joués (borné, éviction
//! FIFO), le curseur VOD et un répertoire de travail temporaire balayé à
//! la fin de la session quel que soit son chemin de sortie.
//!
//! # Suspension
//!
//! Les seuls points de suspension de la boucle sont les sleeps (attente
//! de rechargement, rattrapage live, backoff d'erreur, cadence de frame).
//! La vivacité du sink est re-vérifiée avant chaque transition d'état et
//! à période bornée pendant le transcodage et la diffusion, si bien
//! qu'un raccroché interrompt la session en une frame environ.

mod history;
mod pacer;
mod selector;
mod session;

pub use history::{PlayedHistory, DEFAULT_HISTORY_CAPACITY};
pub use pacer::{deliver, DeliveryOutcome};
pub use selector::{select, Selection, DEFAULT_LIVE_WINDOW};
pub use session::{SessionEnd, SessionError, SessionSettings, StreamingSession};

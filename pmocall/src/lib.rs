//! Abstraction du call leg téléphonique côté audio
//!
//! Cette crate définit le contrat entre le cœur de streaming et la couche
//! de signalisation téléphonique (SIP ou autre), qui reste externe au
//! projet. La signalisation expose chaque appel actif sous la forme d'un
//! [`CallSink`] : un point d'écriture de frames audio brutes, avec un état
//! de vie interrogeable et un raccroché idempotent.
//!
//! # Contrat
//!
//! - [`CallSink::is_live`] : `false` signifie « arrêter immédiatement ».
//! - [`CallSink::write_audio`] : accepte exactement une frame au format
//!   négocié ; une erreur [`SinkError::NotLive`] est équivalente à
//!   `is_live() == false` (l'appel a disparu entre le test et l'écriture).
//! - [`CallSink::hang_up`] : idempotent, sans effet si l'appel est déjà
//!   terminé.
//!
//! Le module [`testing`] fournit un sink scripté utilisé par les tests du
//! pipeline de diffusion.

mod sink;
mod state;

pub mod testing;

pub use sink::{CallSink, SinkError};
pub use state::CallState;

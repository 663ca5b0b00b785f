//! Sink scripté pour les tests du pipeline de diffusion.
//!
//! [`ScriptedSink`] enregistre chaque frame reçue avec son instant
//! d'arrivée (horloge tokio, compatible `start_paused`) et peut être
//! programmé pour « mourir » après un nombre de frames ou après un délai,
//! afin de simuler un raccroché côté appelant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{CallSink, SinkError};

#[derive(Debug)]
struct Inner {
    live: AtomicBool,
    hung_up: AtomicBool,
    frames: Mutex<Vec<(Instant, Vec<u8>)>>,
    die_after_frames: Option<usize>,
    die_at: Option<Instant>,
}

/// Sink de test : enregistre les frames, meurt sur commande.
///
/// Clonable à bas coût (état partagé) : une copie part dans la session,
/// l'autre reste dans le test pour l'inspection finale.
#[derive(Debug, Clone)]
pub struct ScriptedSink {
    inner: Arc<Inner>,
}

impl ScriptedSink {
    /// Sink vivant jusqu'à [`ScriptedSink::kill`] ou `hang_up`.
    pub fn live() -> Self {
        Self::build(None, None)
    }

    /// Sink qui n'accepte plus rien après `n` frames écrites.
    pub fn dies_after_frames(n: usize) -> Self {
        Self::build(Some(n), None)
    }

    /// Sink qui meurt `delay` après sa création.
    pub fn dies_after(delay: Duration) -> Self {
        Self::build(None, Some(Instant::now() + delay))
    }

    fn build(die_after_frames: Option<usize>, die_at: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                live: AtomicBool::new(true),
                hung_up: AtomicBool::new(false),
                frames: Mutex::new(Vec::new()),
                die_after_frames,
                die_at,
            }),
        }
    }

    /// Tue le sink immédiatement (simule un raccroché distant).
    pub fn kill(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
    }

    /// Le sink a-t-il reçu un `hang_up` ?
    pub fn was_hung_up(&self) -> bool {
        self.inner.hung_up.load(Ordering::SeqCst)
    }

    /// Frames reçues, dans l'ordre d'écriture.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.inner
            .frames
            .lock()
            .unwrap()
            .iter()
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// Instants d'écriture de chaque frame.
    pub fn timestamps(&self) -> Vec<Instant> {
        self.inner
            .frames
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| *t)
            .collect()
    }

    /// Nombre de frames reçues.
    pub fn frame_count(&self) -> usize {
        self.inner.frames.lock().unwrap().len()
    }

    /// Concaténation de toutes les frames reçues.
    pub fn received_bytes(&self) -> Vec<u8> {
        self.inner
            .frames
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, f)| f.iter().copied())
            .collect()
    }
}

#[async_trait]
impl CallSink for ScriptedSink {
    fn is_live(&self) -> bool {
        if let Some(deadline) = self.inner.die_at {
            if Instant::now() >= deadline {
                self.inner.live.store(false, Ordering::SeqCst);
            }
        }
        self.inner.live.load(Ordering::SeqCst)
    }

    async fn write_audio(&self, frame: &[u8]) -> Result<(), SinkError> {
        if !self.is_live() {
            return Err(SinkError::NotLive);
        }
        let mut frames = self.inner.frames.lock().unwrap();
        frames.push((Instant::now(), frame.to_vec()));
        if let Some(limit) = self.inner.die_after_frames {
            if frames.len() >= limit {
                self.inner.live.store(false, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn hang_up(&self) {
        self.inner.hung_up.store(true, Ordering::SeqCst);
        self.inner.live.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_frames_in_order() {
        let sink = ScriptedSink::live();
        sink.write_audio(b"aa").await.unwrap();
        sink.write_audio(b"bb").await.unwrap();
        assert_eq!(sink.frames(), vec![b"aa".to_vec(), b"bb".to_vec()]);
    }

    #[tokio::test]
    async fn test_dies_after_configured_frame_count() {
        let sink = ScriptedSink::dies_after_frames(2);
        sink.write_audio(b"1").await.unwrap();
        sink.write_audio(b"2").await.unwrap();
        assert!(!sink.is_live());
        assert!(matches!(
            sink.write_audio(b"3").await,
            Err(SinkError::NotLive)
        ));
        assert_eq!(sink.frame_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dies_after_delay() {
        let sink = ScriptedSink::dies_after(Duration::from_millis(50));
        assert!(sink.is_live());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!sink.is_live());
    }

    #[tokio::test]
    async fn test_hang_up_is_idempotent() {
        let sink = ScriptedSink::live();
        sink.hang_up().await;
        sink.hang_up().await;
        assert!(sink.was_hung_up());
        assert!(!sink.is_live());
    }
}

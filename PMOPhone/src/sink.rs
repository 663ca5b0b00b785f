//! Sink de diagnostic : écrit les frames dans un fichier brut
//!
//! Tient lieu de call leg pendant la mise au point : les frames sont
//! appendées au rythme réel de la session, ce qui permet de vérifier le
//! pont complet (playlist → sélection → FFmpeg → cadence) sans couche
//! de signalisation. Un `hang_up` (Ctrl+C) le rend non-vivant, comme un
//! raccroché.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pmocall::{CallSink, SinkError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Inner {
    file: Mutex<tokio::fs::File>,
    live: AtomicBool,
}

/// Call leg factice adossé à un fichier.
#[derive(Debug, Clone)]
pub struct FileSink {
    inner: Arc<Inner>,
}

impl FileSink {
    /// Crée (ou tronque) le fichier de capture.
    pub async fn create(path: &std::path::Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self {
            inner: Arc::new(Inner {
                file: Mutex::new(file),
                live: AtomicBool::new(true),
            }),
        })
    }
}

#[async_trait]
impl CallSink for FileSink {
    fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    async fn write_audio(&self, frame: &[u8]) -> Result<(), SinkError> {
        if !self.is_live() {
            return Err(SinkError::NotLive);
        }
        let mut file = self.inner.file.lock().await;
        file.write_all(frame).await.map_err(|e| {
            // Un fichier qui ne s'écrit plus vaut un appel disparu.
            self.inner.live.store(false, Ordering::SeqCst);
            SinkError::Write(e.to_string())
        })
    }

    async fn hang_up(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
        let mut file = self.inner.file.lock().await;
        let _ = file.flush().await;
    }
}

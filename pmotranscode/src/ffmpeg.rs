//! Implémentation FFmpeg du [`Transcoder`]
//!
//! Chaque segment suit le même chemin : téléchargement en streaming vers
//! un fichier temporaire du workdir, puis conversion par un processus
//! FFmpeg borné dans le temps. Sur dépassement, le processus est tué PUIS
//! attendu (pas de zombie) ; `kill_on_drop` couvre l'annulation du future
//! par l'appelant (sink disparu en cours de transcodage).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

use crate::audio::TranscodedAudio;
use crate::error::TranscodeError;
use crate::format::TargetFormat;
use crate::Transcoder;

/// Délai maximal d'une conversion FFmpeg (secondes)
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 25;

/// Délai maximal du téléchargement d'un segment (secondes)
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 10;

/// Transcodeur adossé à un binaire FFmpeg externe.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    client: reqwest::Client,
    program: PathBuf,
    transcode_timeout: Duration,
    download_timeout: Duration,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    /// Transcodeur utilisant le `ffmpeg` du PATH.
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Transcodeur utilisant un binaire donné.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            program: program.into(),
            transcode_timeout: Duration::from_secs(DEFAULT_TRANSCODE_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        }
    }

    /// Partage un client HTTP existant (pool de connexions commun).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Ajuste les délais de conversion et de téléchargement.
    pub fn with_timeouts(mut self, transcode: Duration, download: Duration) -> Self {
        self.transcode_timeout = transcode;
        self.download_timeout = download;
        self
    }

    /// Vérifie que le binaire répond à `-version`.
    ///
    /// À appeler au démarrage : mieux vaut refuser de servir que de
    /// découvrir l'absence de FFmpeg au premier appel.
    pub async fn ensure_available(&self) -> Result<(), TranscodeError> {
        let program = self.program.display().to_string();
        let mut child = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TranscodeError::Unavailable(format!("{program}: {e}")))?;

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .map_err(|_| TranscodeError::Unavailable(format!("{program}: -version timed out")))?
            .map_err(TranscodeError::Io)?;

        if !status.success() {
            return Err(TranscodeError::Unavailable(format!(
                "{program}: -version exited with {status}"
            )));
        }
        Ok(())
    }

    /// Télécharge le segment en streaming dans un temporaire du workdir.
    async fn download_segment(
        &self,
        source: &Url,
        workdir: &Path,
    ) -> Result<NamedTempFile, TranscodeError> {
        let input = tempfile::Builder::new()
            .prefix("seg-")
            .suffix(".ts")
            .tempfile_in(workdir)?;

        let response = self
            .client
            .get(source.clone())
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(input.path()).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url = %source, bytes = written, "segment downloaded");
        Ok(input)
    }

    /// Lance FFmpeg et attend sa fin, dans la limite du délai configuré.
    async fn run_ffmpeg(
        &self,
        input: &Path,
        output: &Path,
        format: &TargetFormat,
    ) -> Result<(), TranscodeError> {
        let program = self.program.display().to_string();
        let mut child = Command::new(&self.program)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg("-f")
            .arg(format.encoding.ffmpeg_format())
            .arg("-ar")
            .arg(format.sample_rate.to_string())
            .arg("-ac")
            .arg(format.channels.to_string())
            .arg("-vn")
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        // Drainer stderr en parallèle pour ne pas bloquer le processus
        // si son buffer de pipe se remplit.
        let mut stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(ref mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        match tokio::time::timeout(self.transcode_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => {
                let stderr = stderr_task.await.unwrap_or_default();
                Err(TranscodeError::Exit {
                    status,
                    stderr: stderr.trim().to_string(),
                })
            }
            Ok(Err(e)) => Err(TranscodeError::Io(e)),
            Err(_elapsed) => {
                warn!(program = %program, timeout = ?self.transcode_timeout, "transcode timed out, killing process");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out transcoder");
                }
                Err(TranscodeError::Timeout(self.transcode_timeout))
            }
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &Url,
        format: &TargetFormat,
        workdir: &Path,
    ) -> Result<TranscodedAudio, TranscodeError> {
        // Le temporaire d'entrée est détruit à la sortie de cette
        // fonction, succès comme échec.
        let input = self.download_segment(source, workdir).await?;

        let output = tempfile::Builder::new()
            .prefix("seg-")
            .suffix(".raw")
            .tempfile_in(workdir)?;

        self.run_ffmpeg(input.path(), output.path(), format).await?;

        let len = tokio::fs::metadata(output.path()).await?.len();
        debug!(url = %source, bytes = len, "segment transcoded");
        Ok(TranscodedAudio::new(output, len))
    }
}

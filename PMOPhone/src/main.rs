use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use pmocall::CallSink;
use pmohls::HttpPlaylistFetcher;
use pmostream::{SessionEnd, SessionSettings, StreamingSession};
use pmotranscode::{FfmpegTranscoder, SampleEncoding, TargetFormat};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

mod sink;

use sink::FileSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure ==========

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = pmoconfig::get_config();

    // URL de playlist : argument de ligne de commande, sinon configuration
    let playlist_url = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => config
            .get_playlist_url()
            .context("no playlist URL configured")?,
    };
    let playlist_url = Url::parse(&playlist_url)
        .with_context(|| format!("invalid playlist URL: {playlist_url}"))?;

    let capture_path = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "pmophone-capture.raw".to_string());

    // ========== PHASE 2 : Collaborateurs ==========

    // Vérifier FFmpeg avant d'accepter quoi que ce soit : mieux vaut
    // refuser de démarrer que d'échouer au premier segment.
    info!("🎛️ Checking FFmpeg availability...");
    let transcoder = FfmpegTranscoder::with_program(config.get_ffmpeg_path()?)
        .with_timeouts(
            Duration::from_secs(config.get_transcode_timeout_secs()?),
            Duration::from_secs(config.get_download_timeout_secs()?),
        );
    transcoder
        .ensure_available()
        .await
        .context("FFmpeg not found or not working, install it and ensure it is in PATH")?;

    let fetcher = HttpPlaylistFetcher::new()
        .with_timeout(Duration::from_secs(config.get_fetch_timeout_secs()?));

    let encoding = config.get_encoding()?;
    let target_format = TargetFormat {
        sample_rate: config.get_sample_rate()? as u32,
        channels: config.get_channels()? as u8,
        encoding: SampleEncoding::from_str(&encoding)
            .with_context(|| format!("unsupported sample encoding: {encoding}"))?,
    };
    let frame_duration = Duration::from_millis(config.get_frame_duration_ms()?);

    let mut settings = SessionSettings::for_format(target_format, frame_duration);
    settings.reload_interval = Duration::from_secs(config.get_reload_interval_secs()?);
    settings.live_window = config.get_live_window()? as usize;
    settings.history_capacity = config.get_history_capacity()? as usize;

    // ========== PHASE 3 : Session de diagnostic ==========

    info!("📞 Opening capture sink at {capture_path}");
    let sink = FileSink::create(std::path::Path::new(&capture_path))
        .await
        .with_context(|| format!("cannot create capture file {capture_path}"))?;

    info!(
        "📻 Streaming {} ({} Hz, {} ch, {}, frames of {:?})",
        playlist_url, target_format.sample_rate, target_format.channels, encoding, frame_duration,
    );

    let session = StreamingSession::new(
        playlist_url,
        fetcher,
        transcoder,
        sink.clone(),
        settings,
    )?;

    info!("✅ PMOPhone session {} started, Ctrl+C to hang up", session.id());

    let run = session.run();
    tokio::pin!(run);
    let end = tokio::select! {
        end = &mut run => end,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl+C received, hanging up...");
            sink.hang_up().await;
            // La session détecte le sink mort en une frame et se range.
            run.await
        }
    };

    match end {
        SessionEnd::Completed => {
            info!("✅ Playlist fully delivered");
            Ok(())
        }
        SessionEnd::SinkGone => {
            info!("✅ Session ended, sink closed");
            Ok(())
        }
        SessionEnd::Failed(e) => {
            warn!("❌ Session failed: {e}");
            Err(e.into())
        }
    }
}

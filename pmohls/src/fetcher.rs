//! Playlist fetching over HTTP
//!
//! [`HttpPlaylistFetcher`] downloads and parses an M3U8 playlist into a
//! [`PlaylistSnapshot`]. It accepts either a media playlist or a master
//! playlist; for the latter it follows the first declared variant (one
//! level only), matching what audio-only live streams publish in
//! practice.

use std::time::Duration;

use async_trait::async_trait;
use m3u8_rs::{MediaPlaylist, Playlist};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::{HlsError, Result};
use crate::model::{PlaylistSnapshot, SegmentRef};

/// Default timeout for one playlist request (seconds)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Source of playlist snapshots.
///
/// The streaming loop depends on this trait, not on HTTP: tests drive it
/// with scripted snapshot sequences.
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    /// Fetch the current state of the playlist at `url`.
    ///
    /// Returns the empty snapshot on ANY failure; callers treat emptiness
    /// as a transient condition and retry after a backoff.
    async fn fetch(&self, url: &Url) -> PlaylistSnapshot;
}

/// HTTP implementation of [`PlaylistFetcher`].
#[derive(Debug, Clone)]
pub struct HttpPlaylistFetcher {
    client: Client,
    timeout: Duration,
}

impl Default for HttpPlaylistFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPlaylistFetcher {
    /// Create a fetcher with its own HTTP client and the default timeout.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a fetcher sharing an existing HTTP client.
    ///
    /// Useful to share connection pools with the segment downloader.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch and parse, surfacing the failure cause.
    ///
    /// The [`PlaylistFetcher`] impl wraps this and flattens errors into
    /// the empty snapshot.
    pub async fn fetch_playlist(&self, url: &Url) -> Result<PlaylistSnapshot> {
        let body = self.download(url).await?;

        match parse(&body)? {
            Playlist::MediaPlaylist(media) => build_snapshot(url, &media),
            Playlist::MasterPlaylist(master) => {
                let variant = master.variants.first().ok_or(HlsError::NoVariants)?;
                let variant_url = url.join(&variant.uri)?;
                debug!(master = %url, variant = %variant_url, "following master playlist variant");

                let body = self.download(&variant_url).await?;
                match parse(&body)? {
                    Playlist::MediaPlaylist(media) => build_snapshot(&variant_url, &media),
                    Playlist::MasterPlaylist(_) => Err(HlsError::NestedMaster),
                }
            }
        }
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl PlaylistFetcher for HttpPlaylistFetcher {
    async fn fetch(&self, url: &Url) -> PlaylistSnapshot {
        match self.fetch_playlist(url).await {
            Ok(snapshot) => {
                debug!(
                    url = %url,
                    segments = snapshot.len(),
                    finite = snapshot.is_finite,
                    "playlist fetched"
                );
                snapshot
            }
            Err(e) => {
                warn!(url = %url, error = %e, "playlist fetch failed");
                PlaylistSnapshot::empty()
            }
        }
    }
}

fn parse(body: &[u8]) -> Result<Playlist> {
    m3u8_rs::parse_playlist_res(body).map_err(|e| HlsError::Parse(format!("{e:?}")))
}

/// Convert a parsed media playlist into a snapshot, resolving every
/// segment URI against `base` (the media playlist's own URL).
fn build_snapshot(base: &Url, media: &MediaPlaylist) -> Result<PlaylistSnapshot> {
    if media.segments.is_empty() {
        return Err(HlsError::EmptyPlaylist);
    }

    let mut segments = Vec::with_capacity(media.segments.len());
    for (i, segment) in media.segments.iter().enumerate() {
        let uri = base.join(&segment.uri)?;
        segments.push(SegmentRef::new(uri, Some(media.media_sequence + i as u64)));
    }

    Ok(PlaylistSnapshot {
        segments,
        is_finite: media.end_list,
    })
}

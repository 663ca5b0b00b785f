//! HLS playlist fetching for live and finite audio streams
//!
//! This crate provides the playlist side of the HLS-to-telephony bridge:
//! a small segment/snapshot model and a [`PlaylistFetcher`] that turns a
//! playlist URL into a [`PlaylistSnapshot`].
//!
//! # Contract
//!
//! A fetch NEVER fails from the caller's point of view: network errors,
//! bad HTTP statuses, unparsable bodies and empty playlists all collapse
//! into an empty snapshot, which the streaming loop treats as a transient
//! failure (back off, retry). The detailed cause is logged here.
//!
//! # Example
//!
//! ```no_run
//! use pmohls::{HttpPlaylistFetcher, PlaylistFetcher};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() {
//!     let fetcher = HttpPlaylistFetcher::new();
//!     let url = Url::parse("https://example.com/live/index.m3u8").unwrap();
//!     let snapshot = fetcher.fetch(&url).await;
//!     println!(
//!         "{} segments, finite: {}",
//!         snapshot.segments.len(),
//!         snapshot.is_finite
//!     );
//! }
//! ```

mod error;
mod fetcher;
mod model;

pub use error::{HlsError, Result};
pub use fetcher::{HttpPlaylistFetcher, PlaylistFetcher, DEFAULT_FETCH_TIMEOUT_SECS};
pub use model::{PlaylistSnapshot, SegmentRef};

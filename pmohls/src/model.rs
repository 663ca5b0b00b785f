//! Segment and snapshot model
//!
//! A [`PlaylistSnapshot`] is one fetched, parsed state of the playlist at
//! a point in time. Snapshots are immutable and superseded wholesale by
//! the next reload, never merged.

use url::Url;

/// One media segment of a playlist, addressed by its absolute URI.
///
/// Two segments are the same segment iff their resolved URIs are equal;
/// the media-sequence hint is informational (logging, debugging) and
/// never used for identity.
#[derive(Debug, Clone)]
pub struct SegmentRef {
    /// Absolute segment URI, resolved against the playlist URL.
    pub uri: Url,
    /// Media sequence number, when the playlist provides one.
    pub sequence: Option<u64>,
}

impl SegmentRef {
    pub fn new(uri: Url, sequence: Option<u64>) -> Self {
        Self { uri, sequence }
    }

    /// The URI as a string, the identity key used for deduplication.
    pub fn uri_str(&self) -> &str {
        self.uri.as_str()
    }
}

impl PartialEq for SegmentRef {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for SegmentRef {}

/// One fetched, parsed state of a playlist.
#[derive(Debug, Clone, Default)]
pub struct PlaylistSnapshot {
    /// Segments in playlist order (oldest to newest for live streams).
    pub segments: Vec<SegmentRef>,
    /// `true` for finite (VOD) playlists, `false` for live ones.
    ///
    /// Meaningless when `segments` is empty (a failed fetch).
    pub is_finite: bool,
}

impl PlaylistSnapshot {
    /// The empty snapshot, the uniform representation of a failed fetch.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

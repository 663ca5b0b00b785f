//! Error types for playlist fetching

/// Result type alias for playlist operations
pub type Result<T> = std::result::Result<T, HlsError>;

/// Errors that can occur while fetching and parsing a playlist.
///
/// These never cross the [`crate::PlaylistFetcher`] boundary: the fetcher
/// logs them and returns an empty snapshot instead.
#[derive(Debug, thiserror::Error)]
pub enum HlsError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Playlist body could not be parsed as M3U8
    #[error("playlist parse failed: {0}")]
    Parse(String),

    /// Invalid or unresolvable URL
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Playlist parsed but contains no segments
    #[error("playlist contains no segments")]
    EmptyPlaylist,

    /// A master playlist pointed to another master playlist
    #[error("master playlist nesting is not supported")]
    NestedMaster,

    /// A master playlist declares no variant streams
    #[error("master playlist declares no variants")]
    NoVariants,
}

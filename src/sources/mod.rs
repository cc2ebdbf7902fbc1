pub mod ytdlp;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::audio::track::Track;

pub use ytdlp::YtDlpResolver;

/// Resultado de resolver una consulta: tracks en orden y cuántos fallaron
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub tracks: Vec<Track>,
    pub error_count: usize,
}

impl Resolved {
    pub fn single(track: Track) -> Self {
        Self {
            tracks: vec![track],
            error_count: 0,
        }
    }

    pub fn failed(error_count: usize) -> Self {
        Self {
            tracks: Vec::new(),
            error_count,
        }
    }

    /// Concatena resultados parciales conservando el orden
    pub fn merge(parts: impl IntoIterator<Item = Resolved>) -> Self {
        parts.into_iter().fold(Self::default(), |mut acc, part| {
            acc.tracks.extend(part.tracks);
            acc.error_count += part.error_count;
            acc
        })
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("failed to run extractor: {0}")]
    Process(String),

    #[error("extractor failed: {0}")]
    Extractor(String),

    #[error("invalid extractor output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
}

/// Convierte una consulta (búsqueda o URL) en tracks reproducibles.
///
/// Las consultas de colección (playlists) se resuelven internamente y se
/// devuelven como una única secuencia plana y ordenada.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Resolved, ResolveError>;
}

use async_trait::async_trait;
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ResolveError, Resolved, TrackResolver};
use crate::{audio::track::Track, config::Config};

/// Profundidad máxima de colecciones anidadas (playlist dentro de playlist)
const MAX_DEPTH: usize = 2;

/// Resuelve consultas con yt-dlp sin descargar nada.
pub struct YtDlpResolver {
    program: String,
    concurrency: usize,
    max_entries: usize,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<Option<YtDlpEntry>>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    url: Option<String>,
    webpage_url: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Extracted {
    Single(Track),
    Collection { urls: Vec<String>, missing: usize },
}

impl YtDlpResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.ytdlp_path.clone(),
            concurrency: config.resolver_concurrency.max(1),
            max_entries: config.max_playlist_size,
            timeout: config.resolve_timeout(),
        }
    }

    /// Verifica que yt-dlp esté disponible y devuelve su versión
    pub async fn verify(&self) -> Result<String, ResolveError> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .await
            .map_err(|e| ResolveError::Process(e.to_string()))?;

        if !output.status.success() {
            return Err(ResolveError::Extractor(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    /// Extrae información de la consulta usando yt-dlp
    async fn extract(&self, query: &str) -> Result<Extracted, ResolveError> {
        let max_entries = self.max_entries.to_string();

        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-J",
            "--flat-playlist",
            "--no-warnings",
            "-f", "bestaudio/best",
            "--default-search", "ytsearch",
            "--playlist-end", max_entries.as_str(),
            "--socket-timeout", "30",
        ])
        .arg(query)
        .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))?
            .map_err(|e| ResolveError::Process(e.to_string()))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Extractor(error.trim().to_string()));
        }

        parse_info(&String::from_utf8_lossy(&output.stdout), self.max_entries)
    }

    /// Resuelve en paralelo las entradas de una colección, en orden
    async fn resolve_entries(&self, urls: Vec<String>, missing: usize, depth: usize) -> Resolved {
        if depth > MAX_DEPTH {
            warn!("🚫 Colección demasiado anidada, {} entradas ignoradas", urls.len());
            return Resolved::failed(urls.len() + missing);
        }

        debug!("📋 Resolviendo {} entradas (profundidad {})", urls.len(), depth);

        let parts: Vec<Resolved> = stream::iter(urls)
            .map(|url| self.resolve_nested(url, depth))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut resolved = Resolved::merge(parts);
        resolved.error_count += missing;
        resolved
    }

    fn resolve_nested(&self, url: String, depth: usize) -> BoxFuture<'_, Resolved> {
        async move {
            match self.extract(&url).await {
                Ok(Extracted::Single(track)) => Resolved::single(track),
                Ok(Extracted::Collection { urls, missing }) => {
                    self.resolve_entries(urls, missing, depth + 1).await
                }
                Err(e) => {
                    warn!("❌ No se pudo resolver {}: {}", url, e);
                    Resolved::failed(1)
                }
            }
        }
        .boxed()
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Resolved, ResolveError> {
        info!("🔍 Resolviendo: {}", query);

        let resolved = match self.extract(query).await? {
            Extracted::Single(track) => Resolved::single(track),
            Extracted::Collection { urls, missing } => self.resolve_entries(urls, missing, 1).await,
        };

        info!(
            "✅ {} tracks resueltos ({} errores) para: {}",
            resolved.tracks.len(),
            resolved.error_count,
            query
        );
        Ok(resolved)
    }
}

fn parse_info(json: &str, max_entries: usize) -> Result<Extracted, ResolveError> {
    let info: YtDlpInfo = serde_json::from_str(json.trim())?;

    if let Some(entries) = info.entries {
        let entries: Vec<_> = entries.into_iter().take(max_entries).collect();
        let total = entries.len();
        let urls: Vec<String> = entries
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.url.or(entry.webpage_url))
            .collect();

        return Ok(Extracted::Collection {
            missing: total - urls.len(),
            urls,
        });
    }

    let mut track = Track::new(info.url, info.title, info.id);
    if let Some(page_url) = info.webpage_url {
        track = track.with_page_url(page_url);
    }
    if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d >= 0.0) {
        track = track.with_duration(Duration::from_secs_f64(duration));
    }

    Ok(Extracted::Single(track))
}

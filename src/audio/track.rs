use std::time::Duration;

const UNKNOWN_TRACK_TITLE: &str = "Unknown track";

/// Un track reproducible ya resuelto.
///
/// Todos los campos son opcionales: un campo ausente significa "desconocido",
/// nunca un error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    source_uri: Option<String>,
    title: Option<String>,
    external_id: Option<String>,
    page_url: Option<String>,
    duration: Option<Duration>,
}

impl Track {
    pub fn new(source_uri: Option<String>, title: Option<String>, external_id: Option<String>) -> Self {
        Self {
            source_uri,
            title,
            external_id,
            page_url: None,
            duration: None,
        }
    }

    // Getters
    pub fn source_uri(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_TRACK_TITLE)
    }

    // Setters
    pub fn with_page_url(mut self, page_url: String) -> Self {
        self.page_url = Some(page_url);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

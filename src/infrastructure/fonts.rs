//! Font resources for PDF rendering.
//!
//! The default source uses the PDF standard Helvetica faces, which need no
//! download. `HttpFontSource` fetches a TrueType file once and caches it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Font the PDF writer should use for body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfFont {
    /// One of the 14 standard PDF fonts, referenced by name.
    Standard { base_font: &'static str },
    /// A TrueType program embedded into the document.
    TrueType { name: String, data: Arc<Vec<u8>> },
}

/// Why a font could not be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FontError {
    /// The font could not be fetched (DNS, connect, timeout, HTTP status).
    #[error("font download failed: {0}")]
    Network(String),
    /// The fetched bytes are not a usable TrueType font.
    #[error("invalid font data: {0}")]
    Invalid(String),
}

/// Supplies the body font for PDF exports.
#[async_trait]
pub trait FontSource: Send + Sync {
    async fn load(&self) -> Result<PdfFont, FontError>;
}

/// Built-in Helvetica, always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFonts;

#[async_trait]
impl FontSource for StandardFonts {
    async fn load(&self) -> Result<PdfFont, FontError> {
        Ok(PdfFont::Standard {
            base_font: "Helvetica",
        })
    }
}

/// TrueType font downloaded over HTTP on first use.
pub struct HttpFontSource {
    url: String,
    client: reqwest::Client,
    cache: OnceCell<PdfFont>,
}

impl HttpFontSource {
    /// Create a source for `url` with a request timeout.
    ///
    /// # Errors
    /// Returns `FontError::Network` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FontError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FontError::Network(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            client,
            cache: OnceCell::new(),
        })
    }

    async fn fetch(&self) -> Result<PdfFont, FontError> {
        tracing::info!(url = %self.url, "Fetching PDF font");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FontError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| FontError::Network(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FontError::Network(e.to_string()))?;

        validate_truetype(&bytes)?;

        Ok(PdfFont::TrueType {
            name: font_name_from_url(&self.url),
            data: Arc::new(bytes.to_vec()),
        })
    }
}

#[async_trait]
impl FontSource for HttpFontSource {
    async fn load(&self) -> Result<PdfFont, FontError> {
        self.cache.get_or_try_init(|| self.fetch()).await.cloned()
    }
}

/// Accept TrueType outlines only; CFF-flavoured OpenType needs a different
/// embedding.
fn validate_truetype(bytes: &[u8]) -> Result<(), FontError> {
    const TRUETYPE: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

    match bytes.get(..4) {
        Some(sig) if sig == TRUETYPE || sig == b"true" => Ok(()),
        Some(sig) if sig == b"OTTO" => Err(FontError::Invalid(
            "OpenType CFF fonts are not supported".into(),
        )),
        _ => Err(FontError::Invalid("missing TrueType signature".into())),
    }
}

/// PDF name for an embedded font, derived from the file name in the URL.
fn font_name_from_url(url: &str) -> String {
    let file = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    let name: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();

    if name.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_truetype() {
        assert!(validate_truetype(&[0, 1, 0, 0, 9, 9]).is_ok());
        assert!(validate_truetype(b"true....").is_ok());
        assert!(matches!(
            validate_truetype(b"OTTO...."),
            Err(FontError::Invalid(_))
        ));
        assert!(matches!(
            validate_truetype(b"<html>"),
            Err(FontError::Invalid(_))
        ));
        assert!(validate_truetype(&[]).is_err());
    }

    #[test]
    fn test_font_name_from_url() {
        assert_eq!(
            font_name_from_url("https://fonts.example.com/static/Inter-Regular.ttf?v=2"),
            "Inter-Regular"
        );
        assert_eq!(font_name_from_url("https://example.com/"), "EmbeddedFont");
    }

    #[tokio::test]
    async fn test_standard_fonts_load() {
        let font = StandardFonts.load().await.unwrap();
        assert_eq!(
            font,
            PdfFont::Standard {
                base_font: "Helvetica"
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let source =
            HttpFontSource::new("http://127.0.0.1:9/font.ttf", Duration::from_secs(2)).unwrap();
        assert!(matches!(source.load().await, Err(FontError::Network(_))));
    }
}

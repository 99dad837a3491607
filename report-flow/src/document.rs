use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Media types the workflow knows how to treat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
    PlainText,
    Other(String),
}

impl MediaType {
    /// Parse a MIME type, ignoring parameters such as `; charset=utf-8`.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => MediaType::Pdf,
            "image/png" => MediaType::Png,
            "image/jpeg" | "image/jpg" => MediaType::Jpeg,
            "text/plain" => MediaType::PlainText,
            _ => MediaType::Other(essence),
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(MediaType::Pdf),
            "png" => Some(MediaType::Png),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "txt" => Some(MediaType::PlainText),
            _ => None,
        }
    }

    /// Detect a type from the leading bytes of the content.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            return Some(MediaType::Pdf);
        }
        match image::guess_format(bytes).ok()? {
            ImageFormat::Png => Some(MediaType::Png),
            ImageFormat::Jpeg => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::PlainText => "text/plain",
            MediaType::Other(mime) => mime,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, MediaType::Other(_))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// A file chosen by the user, held in memory for the length of the workflow.
#[derive(Clone, PartialEq, Eq)]
pub struct InputDocument {
    pub name: String,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    /// Build a document, preferring the declared MIME type, then the file
    /// extension, then the content itself.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, declared_mime: Option<&str>) -> Self {
        let name = name.into();
        let declared = declared_mime
            .filter(|mime| !mime.trim().is_empty() && *mime != "application/octet-stream")
            .map(MediaType::from_mime);

        let media_type = declared
            .or_else(|| MediaType::from_extension(Path::new(&name)))
            .or_else(|| MediaType::sniff(&bytes))
            .unwrap_or_else(|| MediaType::Other("application/octet-stream".to_string()));

        Self {
            name,
            media_type,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes, None))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl fmt::Debug for InputDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDocument")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

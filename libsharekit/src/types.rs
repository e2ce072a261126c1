//! Core types for Sharekit

use std::path::Path;

use url::Url;

use crate::error::{Result, SocialError};

/// A unit of content to share: text plus ordered links, images and files
///
/// Link order matters: links are appended to the text in sequence when the
/// status is composed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    pub text: String,
    pub links: Vec<Url>,
    pub images: Vec<ImageData>,
    pub files: Vec<FileData>,
}

impl Item {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_link(mut self, link: Url) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_file(mut self, file: FileData) -> Self {
        self.files.push(file);
        self
    }

    /// Number of links, images and files together
    pub fn attachment_count(&self) -> usize {
        self.links.len() + self.images.len() + self.files.len()
    }

    /// The item's text followed by each link's absolute form, space separated
    pub fn compose_text(&self) -> String {
        let mut status = self.text.clone();
        for link in &self.links {
            status.push(' ');
            status.push_str(link.as_str());
        }
        status
    }
}

/// Supported image MIME types for attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encoded image bytes attached to an [`Item`]
#[derive(Clone, PartialEq)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub mime_type: ImageMimeType,
}

impl ImageData {
    pub fn new(data: Vec<u8>, mime_type: ImageMimeType) -> Self {
        Self { data, mime_type }
    }

    /// Read an image from disk, detecting its type from the extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageMimeType::from_extension)
            .ok_or_else(|| {
                SocialError::InvalidInput(format!(
                    "Unsupported image type: {} (expected jpg, png, gif or webp)",
                    path.display()
                ))
            })?;

        let data = std::fs::read(path).map_err(|e| {
            SocialError::InvalidInput(format!("Failed to read image {}: {}", path.display(), e))
        })?;

        Ok(Self { data, mime_type })
    }

    /// File name sent with the multipart part
    pub fn file_name(&self, index: usize) -> String {
        format!("image{}.{}", index, self.mime_type.extension())
    }
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// An arbitrary file attached to an [`Item`]
#[derive(Clone, PartialEq)]
pub struct FileData {
    pub name: String,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl FileData {
    pub fn new(name: impl Into<String>, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let data = std::fs::read(path).map_err(|e| {
            SocialError::InvalidInput(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        Ok(Self::new(name, data, "application/octet-stream"))
    }
}

impl std::fmt::Debug for FileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileData")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// How a share attempt ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareResult {
    Done,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_compose_text_appends_links_in_order() {
        let item = Item::new("hello")
            .with_link(url("https://example.com/one"))
            .with_link(url("https://example.org/two?x=1"));

        assert_eq!(
            item.compose_text(),
            "hello https://example.com/one https://example.org/two?x=1"
        );
    }

    #[test]
    fn test_compose_text_ignores_images_and_files() {
        let item = Item::new("hello")
            .with_link(url("https://a.example/"))
            .with_image(ImageData::new(vec![1, 2, 3], ImageMimeType::Png))
            .with_file(FileData::new("notes.txt", b"x".to_vec(), "text/plain"));

        assert_eq!(item.compose_text(), "hello https://a.example/");
    }

    #[test]
    fn test_compose_text_without_links() {
        assert_eq!(Item::new("just text").compose_text(), "just text");
    }

    #[test]
    fn test_compose_text_uses_absolute_form() {
        // Url normalizes a bare host to include the root path
        let item = Item::new("").with_link(url("HTTPS://Example.COM"));
        assert_eq!(item.compose_text(), " https://example.com/");
    }

    #[test]
    fn test_attachment_count() {
        let item = Item::new("x")
            .with_link(url("https://a.example/"))
            .with_image(ImageData::new(vec![], ImageMimeType::Jpeg))
            .with_image(ImageData::new(vec![], ImageMimeType::Gif))
            .with_file(FileData::new("f", vec![], "application/pdf"));
        assert_eq!(item.attachment_count(), 4);
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(ImageMimeType::from_extension("JPG"), Some(ImageMimeType::Jpeg));
        assert_eq!(ImageMimeType::from_extension("webp"), Some(ImageMimeType::WebP));
        assert_eq!(ImageMimeType::from_extension("bmp"), None);
    }

    #[test]
    fn test_image_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let image = ImageData::from_path(&path).unwrap();
        assert_eq!(image.mime_type, ImageMimeType::Png);
        assert_eq!(image.data, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(image.file_name(0), "image0.png");
    }

    #[test]
    fn test_image_from_path_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.tiff");
        std::fs::write(&path, b"data").unwrap();

        let result = ImageData::from_path(&path);
        assert!(matches!(result, Err(SocialError::InvalidInput(_))));
    }

    #[test]
    fn test_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let file = FileData::from_path(&path).unwrap();
        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.data, b"%PDF".to_vec());
    }

    #[test]
    fn test_image_debug_omits_bytes() {
        let image = ImageData::new(vec![0; 1024], ImageMimeType::Jpeg);
        let debug = format!("{:?}", image);
        assert!(debug.contains("len: 1024"));
        assert!(!debug.contains("0, 0, 0"));
    }
}

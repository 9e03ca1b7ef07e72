use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Content types the closet accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
        })
    }
}

/// One validated clothing photo. Cloning shares the byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    name: String,
    format: ImageFormat,
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl ImageAsset {
    pub fn new(
        name: impl Into<String>,
        format: ImageFormat,
        bytes: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            bytes: bytes.into(),
            width,
            height,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether both assets point at the same underlying buffer.
    pub fn shares_bytes_with(&self, other: &ImageAsset) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

/// Raw upload handed over by the shell before validation. The format is
/// sniffed from `bytes`; file names and extensions are only labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_name_their_mime_types() {
        assert_eq!(ImageFormat::Png.mime_type(), "image/png");
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageFormat::Jpeg.to_string(), "JPEG");
    }

    #[test]
    fn cloned_assets_share_bytes() {
        let asset = ImageAsset::new("shirt.png", ImageFormat::Png, vec![1u8, 2, 3], 4, 5);
        let copy = asset.clone();
        assert!(copy.shares_bytes_with(&asset));
        assert_eq!(copy.bytes(), &[1, 2, 3]);
        assert_eq!(copy.dimensions(), (4, 5));
        assert_eq!(copy.mime_type(), "image/png");
    }
}

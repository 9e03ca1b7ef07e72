use std::fs;
use std::path::Path;

use image::ImageFormat as DecodedFormat;
use stylist_contracts::closet::{ImageAsset, ImageFormat, ImageUpload};
use stylist_contracts::errors::StylistError;

/// Decodes an upload to prove it is a real PNG or JPEG.
///
/// The format comes from the bytes, never from the file name; the pixels
/// themselves are discarded after the dimensions are read.
pub fn validate_upload(upload: ImageUpload) -> Result<ImageAsset, StylistError> {
    let name = upload.name.clone();
    if upload.bytes.is_empty() {
        return Err(StylistError::invalid_image(name, "file is empty"));
    }

    let sniffed = image::guess_format(&upload.bytes)
        .map_err(|_| StylistError::invalid_image(&name, "unrecognized image data"))?;
    let format = match sniffed {
        DecodedFormat::Png => ImageFormat::Png,
        DecodedFormat::Jpeg => ImageFormat::Jpeg,
        other => {
            return Err(StylistError::invalid_image(
                name,
                format!("unsupported image type {other:?}; upload PNG or JPEG"),
            ));
        }
    };

    let decoded = image::load_from_memory_with_format(&upload.bytes, sniffed).map_err(|err| {
        StylistError::invalid_image(&name, format!("{format} decode failed: {err}"))
    })?;

    Ok(ImageAsset::new(
        name,
        format,
        upload.bytes,
        decoded.width(),
        decoded.height(),
    ))
}

/// Reads a photo from disk. Read failures are reported against the file, the
/// same way a corrupt photo is.
pub fn load_upload(path: &Path) -> Result<ImageUpload, StylistError> {
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string());
    let bytes = fs::read(path).map_err(|err| {
        StylistError::invalid_image(&name, format!("failed reading {}: {err}", path.display()))
    })?;
    Ok(ImageUpload::new(name, bytes))
}

#[cfg(test)]
pub(crate) mod test_images {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat as DecodedFormat, Rgb, RgbImage};

    fn encode(width: u32, height: u32, color: [u8; 3], format: DecodedFormat) -> Vec<u8> {
        let mut canvas = RgbImage::new(width, height);
        for pixel in canvas.pixels_mut() {
            *pixel = Rgb(color);
        }
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut out, format)
            .expect("encode test image");
        out.into_inner()
    }

    pub(crate) fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        encode(width, height, color, DecodedFormat::Png)
    }

    pub(crate) fn jpeg_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        encode(width, height, color, DecodedFormat::Jpeg)
    }

    pub(crate) fn bmp_bytes() -> Vec<u8> {
        encode(2, 2, [0, 0, 0], DecodedFormat::Bmp)
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::{bmp_bytes, jpeg_bytes, png_bytes};
    use super::*;

    #[test]
    fn png_and_jpeg_are_accepted_with_dimensions() -> anyhow::Result<()> {
        let png = validate_upload(ImageUpload::new("shirt.png", png_bytes(6, 4, [10, 20, 30])))?;
        assert_eq!(png.format(), ImageFormat::Png);
        assert_eq!(png.dimensions(), (6, 4));

        let jpeg = validate_upload(ImageUpload::new("jeans.jpg", jpeg_bytes(8, 8, [0, 0, 128])))?;
        assert_eq!(jpeg.format(), ImageFormat::Jpeg);
        assert_eq!(jpeg.mime_type(), "image/jpeg");
        Ok(())
    }

    #[test]
    fn sniffed_format_beats_file_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("mislabeled.jpg");
        fs::write(&path, png_bytes(2, 2, [1, 2, 3]))?;

        let asset = validate_upload(load_upload(&path)?)?;
        assert_eq!(asset.name(), "mislabeled.jpg");
        assert_eq!(asset.format(), ImageFormat::Png);
        Ok(())
    }

    #[test]
    fn corrupt_and_foreign_files_are_rejected() {
        let empty = validate_upload(ImageUpload::new("empty.png", Vec::new()));
        assert_eq!(
            empty.err(),
            Some(StylistError::invalid_image("empty.png", "file is empty"))
        );

        let junk = validate_upload(ImageUpload::new("notes.png", b"not an image".to_vec()));
        assert_eq!(
            junk.err(),
            Some(StylistError::invalid_image("notes.png", "unrecognized image data"))
        );

        let mut truncated = png_bytes(16, 16, [200, 10, 10]);
        truncated.truncate(40);
        let truncated = validate_upload(ImageUpload::new("cut.png", truncated));
        assert!(matches!(
            truncated,
            Err(StylistError::InvalidImage { ref name, ref reason })
                if name == "cut.png" && reason.starts_with("PNG decode failed")
        ));

        let bmp = validate_upload(ImageUpload::new("scan.bmp", bmp_bytes()));
        assert!(matches!(
            bmp,
            Err(StylistError::InvalidImage { ref reason, .. }) if reason.contains("upload PNG or JPEG")
        ));
    }

    #[test]
    fn load_upload_names_upload_after_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("boots.JPG");
        fs::write(&path, jpeg_bytes(3, 3, [90, 60, 30]))?;

        let upload = load_upload(&path)?;
        assert_eq!(upload.name, "boots.JPG");
        assert_eq!(validate_upload(upload)?.format(), ImageFormat::Jpeg);

        let missing = load_upload(&temp.path().join("missing.png"));
        assert!(matches!(
            missing,
            Err(StylistError::InvalidImage { ref name, .. }) if name == "missing.png"
        ));
        Ok(())
    }
}

use std::io::Cursor;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use tracing::{debug, warn};
use crate::config::CompressionConfig;
use super::errors::{Result, UploadError};
use super::task::FileSource;

/// 上传前的压缩阶段
pub trait Compressor: Send + Sync {
    /// Return a smaller copy of `file`, or the file itself when there is nothing to gain
    fn compress(&self, file: &FileSource) -> Result<FileSource>;
}

/// Downscales and re-encodes JPEG and PNG images that exceed the configured limits
#[derive(Debug, Clone)]
pub struct ImageCompressor {
    max_dimension: u32,
    max_size_bytes: u64,
    jpeg_quality: u8,
}

impl ImageCompressor {
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            max_dimension: config.max_dimension.max(1),
            max_size_bytes: config.max_size_bytes,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    fn output_format(&self, format: ImageFormat) -> Result<ImageOutputFormat> {
        match format {
            ImageFormat::Jpeg => Ok(ImageOutputFormat::Jpeg(self.jpeg_quality)),
            ImageFormat::Png => Ok(ImageOutputFormat::Png),
            other => Err(UploadError::Compression(format!("Cannot re-encode {:?}", other))),
        }
    }
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self::new(&CompressionConfig::default())
    }
}

impl Compressor for ImageCompressor {
    fn compress(&self, file: &FileSource) -> Result<FileSource> {
        if !file.is_image() {
            return Ok(file.clone());
        }

        let format = ImageFormat::from_mime_type(&file.mime_type)
            .ok_or_else(|| UploadError::Compression(format!("Unknown image type {}", file.mime_type)))?;

        let (width, height) = image::io::Reader::with_format(Cursor::new(&file.data[..]), format)
            .into_dimensions()
            .map_err(|err| UploadError::Compression(err.to_string()))?;

        let oversized = width > self.max_dimension || height > self.max_dimension;
        if !oversized && file.size() <= self.max_size_bytes {
            return Ok(file.clone());
        }

        let output_format = self.output_format(format)?;
        let mut image = image::load_from_memory_with_format(&file.data, format)
            .map_err(|err| UploadError::Compression(err.to_string()))?;

        if oversized {
            // resize 保持宽高比
            image = image.resize(self.max_dimension, self.max_dimension, FilterType::Triangle);
        }

        // JPEG 不支持 alpha 通道
        if format == ImageFormat::Jpeg {
            image = DynamicImage::ImageRgb8(image.to_rgb8());
        }

        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, output_format)
            .map_err(|err| UploadError::Compression(err.to_string()))?;
        let data = buffer.into_inner();

        if data.len() as u64 >= file.size() {
            debug!(file = %file.name, "Re-encoded image is not smaller, keeping original");
            return Ok(file.clone());
        }

        Ok(FileSource::new(file.name.clone(), file.mime_type.clone(), data))
    }
}

/// Best-effort compression: any failure yields the original payload
pub(crate) fn compress_or_original(compressor: &dyn Compressor, file: FileSource) -> FileSource {
    match compressor.compress(&file) {
        Ok(mut output) => {
            output.name = file.name;
            output.mime_type = file.mime_type;
            output
        }
        Err(err) => {
            warn!(file = %file.name, error = %err, "Compression failed, uploading original");
            file
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encode(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let buffer = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(buffer).write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn compressor(max_dimension: u32) -> ImageCompressor {
        ImageCompressor::new(&CompressionConfig {
            enabled: true,
            max_dimension,
            max_size_bytes: 64 * 1024,
            jpeg_quality: 60,
        })
    }

    #[test]
    fn test_non_image_is_untouched() {
        let file = FileSource::new("report.pdf", "application/pdf", vec![7u8; 4096]);
        let output = compressor(256).compress(&file).unwrap();
        assert_eq!(output.data, file.data);
    }

    #[test]
    fn test_small_image_is_untouched() {
        let data = encode(32, 32, ImageOutputFormat::Png);
        let file = FileSource::new("icon.png", "image/png", data);
        let output = compressor(256).compress(&file).unwrap();
        assert_eq!(output.data, file.data);
    }

    #[test]
    fn test_oversized_jpeg_shrinks() {
        let data = encode(1600, 1200, ImageOutputFormat::Jpeg(95));
        let file = FileSource::new("holiday.jpg", "image/jpeg", data);
        let output = compressor(400).compress(&file).unwrap();

        assert!(output.size() < file.size());
        assert_eq!(output.name, "holiday.jpg");
        assert_eq!(output.mime_type, "image/jpeg");

        let decoded = image::load_from_memory(&output.data).unwrap();
        assert_eq!(decoded.width(), 400);
        assert_eq!(decoded.height(), 300);
    }

    #[test]
    fn test_oversized_png_shrinks() {
        let data = encode(1024, 512, ImageOutputFormat::Png);
        let file = FileSource::new("diagram.png", "image/png", data);
        let output = compressor(256).compress(&file).unwrap();

        assert!(output.size() < file.size());
        let decoded = image::load_from_memory(&output.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (256, 128));
    }

    #[test]
    fn test_corrupt_image_falls_back() {
        let file = FileSource::new("broken.jpg", "image/jpeg", vec![0u8; 2048]);
        assert!(compressor(256).compress(&file).is_err());

        let output = compress_or_original(&compressor(256), file.clone());
        assert_eq!(output.data, file.data);
        assert_eq!(output.name, "broken.jpg");
    }

    #[test]
    fn test_unsupported_image_type_falls_back() {
        let file = FileSource::new("vector.svg", "image/svg+xml", b"<svg/>".to_vec());
        let output = compress_or_original(&compressor(256), file.clone());
        assert_eq!(output.data, file.data);
        assert_eq!(output.mime_type, "image/svg+xml");
    }
}

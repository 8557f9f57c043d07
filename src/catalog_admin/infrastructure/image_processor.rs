use crate::domain::error::DomainError;
use crate::domain::image::Raster;
use crate::domain::image_processor_trait::ImageProcessor;
use crate::domain::resize_spec::ResizeSpec;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::io::{Limits, Reader};
use image::{ColorType, DynamicImage, ImageError, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

// 補間付きのリサンプル (nearest-neighbor は使わない)
const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// Ceilings applied while decoding untrusted uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_dimension: 12_000,
            max_alloc_bytes: 512 * 1024 * 1024,
        }
    }
}

pub struct DefaultImageProcessor {
    limits: DecodeLimits,
}

impl DefaultImageProcessor {
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    fn reader_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.limits.max_dimension);
        limits.max_image_height = Some(self.limits.max_dimension);
        limits.max_alloc = Some(self.limits.max_alloc_bytes);
        limits
    }
}

/// `floor(height * target_width / width)`, never below 1.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = u64::from(height) * u64::from(target_width) / u64::from(width.max(1));
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

/// Width is capped at `max_width`; narrower images keep their size.
pub fn capped_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        (width, height)
    } else {
        (max_width, scaled_height(width, height, max_width))
    }
}

/// Resizes with interpolation. Always returns a fresh image.
pub fn resize_to(pixels: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (pixels.width(), pixels.height()) == (width, height) {
        pixels.clone()
    } else {
        pixels.resize_exact(width, height, RESAMPLE_FILTER)
    }
}

// 白で塗りつぶしたキャンバスの上に合成する (透明部分は白になる)
fn flatten_onto_white(pixels: &DynamicImage) -> DynamicImage {
    let top = pixels.to_rgba8();
    let mut canvas = RgbaImage::from_pixel(top.width(), top.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &top, 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).into_rgb8())
}

fn map_decode_error(err: ImageError) -> DomainError {
    match err {
        ImageError::Limits(e) => DomainError::ResourceExhausted(e.to_string()),
        // 判定はできたがデコードできない (途中で切れている、非対応のプロファイル等)
        other => DomainError::CorruptData(other.to_string()),
    }
}

impl ImageProcessor for DefaultImageProcessor {
    fn decode(&self, image_bytes: &[u8]) -> Result<Raster, DomainError> {
        let format = image::guess_format(image_bytes)
            .map_err(|_| DomainError::UnsupportedFormat("could not detect image type".to_string()))?;
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(DomainError::UnsupportedFormat(format!("{:?}", format)));
        }

        let mut reader = Reader::with_format(Cursor::new(image_bytes), format);
        reader.limits(self.reader_limits());
        let pixels = reader.decode().map_err(map_decode_error)?;
        debug!(
            "Decoded {:?} image {}x{} ({} bytes)",
            format,
            pixels.width(),
            pixels.height(),
            image_bytes.len()
        );
        Raster::new(pixels, Some(format))
    }

    fn resample(&self, raster: &Raster, spec: &ResizeSpec) -> Raster {
        let (width, height) = capped_dimensions(raster.width(), raster.height(), spec.max_width());
        let resized = resize_to(raster.pixels(), width, height);

        // 出力は JPEG 固定なのでアルファは保持できない
        let opaque = if raster.has_alpha() {
            flatten_onto_white(&resized)
        } else {
            DynamicImage::ImageRgb8(resized.into_rgb8())
        };
        raster.derive(opaque)
    }

    fn encode(&self, raster: &Raster, quality: u8) -> Result<Vec<u8>, DomainError> {
        let rgb = raster.pixels().to_rgb8();
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            encoder
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                .map_err(|e| DomainError::EncodeFailed(e.to_string()))?;
        }
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn processor() -> DefaultImageProcessor {
        DefaultImageProcessor::new(DecodeLimits::default())
    }

    const WEBP_1X1_LOSSLESS: [u8; 34] = [
        0x52, 0x49, 0x46, 0x46, 0x1a, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50, 0x56, 0x50, 0x38, 0x4c, 0x0d,
        0x00, 0x00, 0x00, 0x2f, 0x00, 0x00, 0x00, 0x10, 0x07, 0x10, 0x11, 0x11, 0x88, 0x88, 0xfe, 0x07, 0x00,
    ];

    fn encode_as(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_scaled_height_floors_and_clamps() {
        assert_eq!(scaled_height(2000, 1000, 1080), 540);
        assert_eq!(scaled_height(1000, 333, 300), 99); // 99.9 -> 99
        assert_eq!(scaled_height(1000, 1, 10), 1);
        assert_eq!(capped_dimensions(800, 600, 1080), (800, 600));
        assert_eq!(capped_dimensions(1080, 600, 1080), (1080, 600));
    }

    #[test]
    fn test_decode_supported_formats_roundtrip_dimensions() {
        let processor = processor();
        let spec = ResizeSpec::new(1080, 100).unwrap();
        let source = gradient(37, 21);

        for format in [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif] {
            let input = if format == ImageFormat::Gif {
                DynamicImage::ImageRgba8(source.to_rgba8())
            } else {
                source.clone()
            };
            let raster = processor.decode(&encode_as(&input, format)).unwrap();
            assert_eq!(raster.source_format(), Some(format));

            let resampled = processor.resample(&raster, &spec);
            let jpeg = processor.encode(&resampled, spec.quality()).unwrap();
            let redecoded = processor.decode(&jpeg).unwrap();
            assert_eq!((redecoded.width(), redecoded.height()), (37, 21), "format {:?}", format);
            assert_eq!(redecoded.source_format(), Some(ImageFormat::Jpeg));
        }

        // image 0.24 は WebP をエンコードできないので、1x1 の lossless WebP をそのまま使う
        let raster = processor.decode(&WEBP_1X1_LOSSLESS).unwrap();
        assert_eq!(raster.source_format(), Some(ImageFormat::WebP));
        assert_eq!((raster.width(), raster.height()), (1, 1));
        let jpeg = processor.encode(&processor.resample(&raster, &spec), spec.quality()).unwrap();
        let redecoded = processor.decode(&jpeg).unwrap();
        assert_eq!((redecoded.width(), redecoded.height()), (1, 1));
    }

    #[test]
    fn test_decode_rejects_unknown_and_unsupported_formats() {
        let processor = processor();
        assert!(matches!(
            processor.decode(&[1, 2, 3, 4]),
            Err(DomainError::UnsupportedFormat(_))
        ));

        let bmp = encode_as(&gradient(4, 4), ImageFormat::Bmp);
        assert!(matches!(processor.decode(&bmp), Err(DomainError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_decode_truncated_png_is_corrupt() {
        let png = encode_as(&gradient(64, 64), ImageFormat::Png);
        let truncated = &png[..png.len() / 2];
        assert!(matches!(processor().decode(truncated), Err(DomainError::CorruptData(_))));
    }

    #[test]
    fn test_decode_enforces_dimension_limit() {
        let processor = DefaultImageProcessor::new(DecodeLimits {
            max_dimension: 100,
            ..DecodeLimits::default()
        });
        let png = encode_as(&gradient(200, 10), ImageFormat::Png);
        assert!(matches!(processor.decode(&png), Err(DomainError::ResourceExhausted(_))));
    }

    #[test]
    fn test_resample_caps_width_and_keeps_narrow_images() {
        let processor = processor();
        let raster = Raster::new(gradient(2000, 1000), Some(ImageFormat::Jpeg)).unwrap();

        let capped = processor.resample(&raster, &ResizeSpec::new(1080, 90).unwrap());
        assert_eq!((capped.width(), capped.height()), (1080, 540));

        let untouched = processor.resample(&raster, &ResizeSpec::new(4000, 90).unwrap());
        assert_eq!((untouched.width(), untouched.height()), (2000, 1000));

        // 入力は変更されない
        assert_eq!((raster.width(), raster.height()), (2000, 1000));
    }

    #[test]
    fn test_resample_thin_image_clamps_height() {
        let raster = Raster::new(gradient(1000, 1), Some(ImageFormat::Png)).unwrap();
        let out = processor().resample(&raster, &ResizeSpec::new(10, 90).unwrap());
        assert_eq!((out.width(), out.height()), (10, 1));
    }

    #[test]
    fn test_transparent_png_becomes_white_jpeg() {
        let processor = processor();
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 8, Rgba([0, 0, 0, 0])));
        let raster = processor.decode(&encode_as(&transparent, ImageFormat::Png)).unwrap();
        assert!(raster.has_alpha());

        let resampled = processor.resample(&raster, &ResizeSpec::new(8, 100).unwrap());
        assert!(!resampled.has_alpha());
        let rgb = resampled.pixels().to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(7, 3), &Rgb([255, 255, 255]));

        let jpeg = processor.encode(&resampled, 100).unwrap();
        let decoded = processor.decode(&jpeg).unwrap().pixels().to_rgb8();
        for (x, y) in [(0, 0), (7, 0), (0, 3), (7, 3)] {
            let Rgb([r, g, b]) = *decoded.get_pixel(x, y);
            // JPEG の量子化誤差を許容
            assert!(r >= 253 && g >= 253 && b >= 253, "corner ({}, {}) = {:?}", x, y, (r, g, b));
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let processor = processor();
        let raster = Raster::new(gradient(50, 30), None).unwrap();
        let first = processor.encode(&raster, 85).unwrap();
        let second = processor.encode(&raster, 85).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(&[0xFF, 0xD8]));
    }
}

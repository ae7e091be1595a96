//! # 解码与重编码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → RGBA8 像素 → PNG/JPEG/WEBP 字节”的过程集中管理。
//! 优先做签名与尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 空字节 / 非图片签名直接判定为解码失败
//! 2. 读取 header 尺寸，按像素与内存上限快速拒绝
//! 3. 完整解码并统一转换为 RGBA8
//! 4. 按归一化后的 `ImageType` 以质量 100 重编码
//!    - PNG：RGBA8 无损
//!    - JPEG：去掉 alpha 后按 RGB8、质量 100 编码
//!    - WEBP：RGBA8 无损（即质量 100 的对应形式）

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};

use super::config::ENCODE_QUALITY;
use super::source::{PixelBuffer, RawImageData};
use super::{ImageConfig, ImageError, ImageHandler, ImageType};

impl ImageHandler {
    /// 将原始字节解码为 RGBA8 像素缓冲。
    pub(crate) fn decode_to_pixels(
        raw: &RawImageData,
        config: &ImageConfig,
    ) -> Result<PixelBuffer, ImageError> {
        Self::validate_image_signature(&raw.bytes)?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let image = decoded.into_rgba8();
        if image.width() == 0 || image.height() == 0 {
            return Err(ImageError::Decode("解码结果为空图".to_string()));
        }

        log::info!(
            "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
            raw.source_hint,
            image.width(),
            image.height()
        );

        Ok(PixelBuffer { image })
    }

    /// 将像素缓冲按目标格式重编码，质量固定为 100。
    pub(crate) fn reencode(pixels: &PixelBuffer, target: ImageType) -> Result<Vec<u8>, ImageError> {
        let (width, height) = (pixels.width(), pixels.height());
        let mut buf = Vec::new();

        match target {
            ImageType::Png => PngEncoder::new(&mut buf)
                .write_image(pixels.image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| ImageError::Encode(format!("PNG 编码失败：{}", e)))?,
            ImageType::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(pixels.image.clone()).into_rgb8();
                JpegEncoder::new_with_quality(&mut buf, ENCODE_QUALITY)
                    .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| ImageError::Encode(format!("JPEG 编码失败：{}", e)))?
            }
            ImageType::Webp => WebPEncoder::new_lossless(&mut buf)
                .encode(pixels.image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| ImageError::Encode(format!("WEBP 编码失败：{}", e)))?,
        }

        if buf.is_empty() {
            return Err(ImageError::Encode(format!("{} 编码结果为空", target)));
        }

        log::debug!("🗜️ 重编码完成 - 格式: {} 大小: {} bytes", target, buf.len());
        Ok(buf)
    }

    /// 通过文件签名（magic bytes）拒绝明显不是图片的内容。
    ///
    /// 签名无法识别时交给解码器做最终判断。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Decode("图片内容为空".to_string()));
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(ImageError::Decode(format!(
                    "文件签名不是图片类型：{}",
                    kind.mime_type()
                )));
            }
        }

        Ok(())
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;

        if reader.format().is_none() {
            return Err(ImageError::Decode("无法识别图片格式".to_string()));
        }

        reader
            .into_dimensions()
            .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels == 0 {
            return Err(ImageError::Decode(format!("图片尺寸无效：{}x{}", width, height)));
        }

        if pixels > config.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &ImageConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ImageError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};

    fn create_image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });

        let dyn_img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).into_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, format)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn raw(bytes: Vec<u8>) -> RawImageData {
        RawImageData {
            bytes,
            type_hint: None,
            source_hint: "test",
        }
    }

    #[test]
    fn decodes_png_jpeg_and_webp_sources() {
        let config = ImageConfig::default();

        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP] {
            let pixels = ImageHandler::decode_to_pixels(&raw(create_image_bytes(32, 16, format)), &config)
                .expect("decode should succeed");

            assert_eq!((pixels.width(), pixels.height()), (32, 16));
            assert_eq!(pixels.image.as_raw().len(), 32 * 16 * 4);
        }
    }

    #[test]
    fn empty_payload_is_decode_error() {
        let result = ImageHandler::decode_to_pixels(&raw(Vec::new()), &ImageConfig::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn non_image_payload_is_decode_error() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n".to_vec();
        let result = ImageHandler::decode_to_pixels(&raw(pdf), &ImageConfig::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));

        let text = b"just some words in a text file".to_vec();
        let result = ImageHandler::decode_to_pixels(&raw(text), &ImageConfig::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn truncated_png_is_decode_error() {
        let mut bytes = create_image_bytes(64, 64, ImageFormat::Png);
        bytes.truncate(bytes.len() / 2);

        let result = ImageHandler::decode_to_pixels(&raw(bytes), &ImageConfig::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn rejects_too_many_pixels_before_decode() {
        let mut config = ImageConfig::default();
        config.max_decoded_pixels = 1_000;

        let result =
            ImageHandler::decode_to_pixels(&raw(create_image_bytes(100, 100, ImageFormat::Png)), &config);
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn reencode_produces_requested_format() {
        let config = ImageConfig::default();
        let pixels =
            ImageHandler::decode_to_pixels(&raw(create_image_bytes(20, 10, ImageFormat::Png)), &config)
                .expect("decode should succeed");

        for (target, expected) in [
            (ImageType::Png, ImageFormat::Png),
            (ImageType::Jpeg, ImageFormat::Jpeg),
            (ImageType::Webp, ImageFormat::WebP),
        ] {
            let encoded = ImageHandler::reencode(&pixels, target).expect("reencode should succeed");
            assert_eq!(image::guess_format(&encoded).expect("guess format"), expected);

            let roundtrip = image::load_from_memory(&encoded).expect("reencoded bytes decode");
            assert_eq!((roundtrip.width(), roundtrip.height()), (20, 10));
        }
    }

    #[test]
    fn lossless_targets_preserve_pixels() {
        let config = ImageConfig::default();
        let pixels =
            ImageHandler::decode_to_pixels(&raw(create_image_bytes(12, 12, ImageFormat::Png)), &config)
                .expect("decode should succeed");

        for target in [ImageType::Png, ImageType::Webp] {
            let encoded = ImageHandler::reencode(&pixels, target).expect("reencode should succeed");
            let roundtrip = image::load_from_memory(&encoded)
                .expect("reencoded bytes decode")
                .into_rgba8();
            assert_eq!(roundtrip.as_raw(), pixels.image.as_raw());
        }
    }

    #[test]
    fn reencode_is_deterministic() {
        let config = ImageConfig::default();
        let pixels =
            ImageHandler::decode_to_pixels(&raw(create_image_bytes(16, 16, ImageFormat::Png)), &config)
                .expect("decode should succeed");

        let first = ImageHandler::reencode(&pixels, ImageType::Jpeg).expect("first encode");
        let second = ImageHandler::reencode(&pixels, ImageType::Jpeg).expect("second encode");
        assert_eq!(first, second);
    }
}

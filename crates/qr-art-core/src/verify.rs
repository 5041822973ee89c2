//! Проверка читаемости сгенерированного QR
//!
//! Использует rqrr как основной декодер с fallback на rxing. Художественные
//! QR часто имеют "грязную" гистограмму, поэтому перебираем несколько
//! вариантов подготовки изображения.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use rxing::qrcode::QRCodeReader;
use rxing::{BarcodeFormat, DecodingHintDictionary, Reader};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ошибки проверки
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("No QR code found in image")]
    NotFound,

    #[error("Decoded content does not match: expected {expected:?}, got {actual:?}")]
    Mismatch { expected: String, actual: String },
}

/// Декодированный QR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedQr {
    pub content: String,
    /// Версия (1-40), если декодер её сообщает
    pub version: Option<u8>,
}

/// Проверка читаемости с fallback-цепочкой
pub struct ScanVerifier {
    /// Максимальная сторона перед декодированием
    max_dimension: u32,
    /// Пробовать инвертированное изображение
    try_inverted: bool,
}

impl Default for ScanVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanVerifier {
    pub fn new() -> Self {
        Self {
            max_dimension: 1000,
            try_inverted: true,
        }
    }

    /// Декодирование QR с изображения
    pub fn decode(&self, img: &DynamicImage) -> Result<DecodedQr, VerifyError> {
        let gray = self.resize(&img.to_luma8());

        let mut candidates = vec![("plain", gray.clone())];
        let stretched = contrast_stretch(&gray);
        if self.try_inverted {
            candidates.push(("inverted", invert(&gray)));
        }
        candidates.push(("stretched", stretched.clone()));
        if self.try_inverted {
            candidates.push(("stretched+inverted", invert(&stretched)));
        }
        candidates.push(("threshold", threshold(&gray, 128)));

        for (label, candidate) in &candidates {
            if let Ok(result) = decode_with_rqrr(candidate) {
                log::debug!("Verify: rqrr succeeded on {} image", label);
                return Ok(result);
            }
            if let Ok(result) = decode_with_rxing(candidate) {
                log::debug!("Verify: rxing succeeded on {} image", label);
                return Ok(result);
            }
        }

        Err(VerifyError::NotFound)
    }

    /// Проверка, что изображение декодируется в `expected`
    pub fn verify(&self, img: &DynamicImage, expected: &str) -> Result<DecodedQr, VerifyError> {
        let decoded = self.decode(img)?;
        if decoded.content != expected {
            return Err(VerifyError::Mismatch {
                expected: expected.to_string(),
                actual: decoded.content,
            });
        }
        Ok(decoded)
    }

    fn resize(&self, img: &GrayImage) -> GrayImage {
        let (width, height) = img.dimensions();
        let max = self.max_dimension;
        if width <= max && height <= max {
            return img.clone();
        }

        let scale = max as f32 / width.max(height) as f32;
        let new_width = ((width as f32 * scale) as u32).max(1);
        let new_height = ((height as f32 * scale) as u32).max(1);
        image::imageops::resize(img, new_width, new_height, FilterType::Triangle)
    }
}

fn decode_with_rqrr(img: &GrayImage) -> Result<DecodedQr, VerifyError> {
    let (width, height) = img.dimensions();
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| img.get_pixel(x as u32, y as u32).0[0],
    );

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((meta, content)) => {
                return Ok(DecodedQr {
                    content,
                    version: Some(meta.version.0 as u8),
                });
            }
            Err(e) => log::debug!("RQRR: decode failed: {:?}", e),
        }
    }

    Err(VerifyError::NotFound)
}

fn decode_with_rxing(img: &GrayImage) -> Result<DecodedQr, VerifyError> {
    let (width, height) = img.dimensions();

    // Packed ARGB: 0xAARRGGBB with gray repeated
    let pixels: Vec<u32> = img
        .as_raw()
        .iter()
        .map(|&gray| {
            let g = gray as u32;
            0xFF000000 | (g << 16) | (g << 8) | g
        })
        .collect();

    let source =
        rxing::RGBLuminanceSource::new_with_width_height_pixels(width as usize, height as usize, &pixels);
    let mut bitmap = rxing::BinaryBitmap::new(rxing::common::HybridBinarizer::new(source));

    let mut hints = DecodingHintDictionary::new();
    hints.insert(
        rxing::DecodeHintType::POSSIBLE_FORMATS,
        rxing::DecodeHintValue::PossibleFormats(std::collections::HashSet::from([
            BarcodeFormat::QR_CODE,
        ])),
    );
    hints.insert(
        rxing::DecodeHintType::TRY_HARDER,
        rxing::DecodeHintValue::TryHarder(true),
    );

    let mut reader = QRCodeReader::new();
    match reader.decode_with_hints(&mut bitmap, &hints) {
        Ok(result) => Ok(DecodedQr {
            content: result.getText().to_string(),
            version: None,
        }),
        Err(e) => {
            log::debug!("RXING: {}", e);
            Err(VerifyError::NotFound)
        }
    }
}

/// Растяжение гистограммы на весь диапазон 0-255
fn contrast_stretch(img: &GrayImage) -> GrayImage {
    let (min_val, max_val) = img
        .pixels()
        .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));

    if min_val >= max_val {
        return img.clone();
    }

    let range = (max_val - min_val) as f32;
    let mut result = img.clone();
    for p in result.pixels_mut() {
        p.0[0] = ((p.0[0] - min_val) as f32 / range * 255.0) as u8;
    }
    result
}

fn invert(img: &GrayImage) -> GrayImage {
    let mut result = img.clone();
    for p in result.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
    result
}

/// Жёсткая бинаризация по порогу
fn threshold(img: &GrayImage, level: u8) -> GrayImage {
    let mut result = img.clone();
    for p in result.pixels_mut() {
        *p = Luma([if p.0[0] < level { 0 } else { 255 }]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::QrMatrix;

    #[test]
    fn test_plain_control_image_decodes() {
        let control = QrMatrix::encode("https://example.com", 4).unwrap().control_image(8);
        let verifier = ScanVerifier::new();
        let decoded = verifier
            .verify(&DynamicImage::ImageRgb8(control), "https://example.com")
            .unwrap();
        assert_eq!(decoded.content, "https://example.com");
    }

    #[test]
    fn test_blank_image_not_found() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 50, Luma([128])));
        assert!(matches!(ScanVerifier::new().decode(&img), Err(VerifyError::NotFound)));
    }

    #[test]
    fn test_mismatch_reported() {
        let control = QrMatrix::encode("abc", 4).unwrap().control_image(8);
        let err = ScanVerifier::new()
            .verify(&DynamicImage::ImageRgb8(control), "xyz")
            .unwrap_err();
        assert!(matches!(err, VerifyError::Mismatch { .. }));
    }

    #[test]
    fn test_contrast_stretch_range() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([100]));
        img.put_pixel(1, 0, Luma([150]));
        let out = contrast_stretch(&img);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }
}

//! Постобработка результата генерации
//!
//! Структура QR подчёркивается "burn & dodge": под тёмными модулями картинка
//! затемняется, под светлыми - осветляется. Finder patterns усиливаются
//! сильнее остальных модулей.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

use crate::classic::finder_mask;
use crate::enhance;
use crate::plan::PostBoost;
use crate::ArtError;

/// Радиус размытия альфы finder-маски
const FINDER_FEATHER: f32 = 4.0;

/// Усиление контраста и резкости (Hidden режим)
pub fn boost(img: &RgbImage, boost: PostBoost) -> RgbImage {
    let contrasted = enhance::contrast(img, boost.contrast);
    enhance::sharpness(&contrasted, boost.sharpness)
}

/// Наложение структуры QR на сгенерированное изображение.
///
/// `control` - управляющее изображение (чёрные модули на белом), `data` нужна
/// для отдельной маски finder patterns. Если маску построить не удалось,
/// возвращается результат без усиления finder patterns.
pub fn blend_qr_contrast(ai: &RgbImage, control: &RgbImage, data: &str, opacity: f32) -> RgbImage {
    let (width, height) = ai.dimensions();
    let control = imageops::resize(control, width, height, FilterType::Nearest);
    let control = enhance::to_gray(&control);

    let shadow_factor = 0.4 - opacity * 0.2;
    let highlight_factor = 1.0 + opacity * 0.8;

    let shadow = enhance::brightness(ai, shadow_factor.max(0.1));
    let highlight = enhance::brightness(ai, highlight_factor);
    let global = enhance::composite(&highlight, &shadow, &control);
    let blended = enhance::blend(ai, &global, opacity);

    match enhance_finders(ai, &blended, data, opacity, shadow_factor, highlight_factor) {
        Ok(result) => result,
        Err(e) => {
            log::warn!("Finder enhancement failed: {}", e);
            blended
        }
    }
}

fn enhance_finders(
    ai: &RgbImage,
    blended: &RgbImage,
    data: &str,
    opacity: f32,
    shadow_factor: f32,
    highlight_factor: f32,
) -> Result<RgbImage, ArtError> {
    let (width, height) = ai.dimensions();
    // Border must match the control image (0), otherwise the mask is misaligned
    let mask = finder_mask(data, width, 0)?;
    let mask = if mask.height() != height {
        imageops::resize(&mask, width, height, FilterType::Nearest)
    } else {
        mask
    };

    let mut alpha = GrayImage::new(width, height);
    let mut pattern = GrayImage::new(width, height);
    for (x, y, p) in mask.enumerate_pixels() {
        let [r, g, b, a] = p.0;
        alpha.put_pixel(x, y, Luma([a]));
        pattern.put_pixel(x, y, Luma([enhance::luma(&image::Rgb([r, g, b]))]));
    }
    let alpha = enhance::gaussian_blur_gray(&alpha, FINDER_FEATHER);

    let deep_shadow = enhance::brightness(ai, (shadow_factor - 0.1).max(0.05));
    let bright_highlight = enhance::brightness(ai, highlight_factor + 0.2);
    let finder_contrast = enhance::composite(&bright_highlight, &deep_shadow, &pattern);

    // Finders follow the base opacity: at 0 they stay untouched
    let finder_opacity = if opacity > 0.0 {
        (opacity + 0.15).min(1.0)
    } else {
        0.0
    };
    let finders = enhance::blend(blended, &finder_contrast, finder_opacity);

    Ok(enhance::composite(&finders, blended, &alpha))
}

//! Модуль базовых операций над изображениями
//!
//! Усиление яркости, контраста, насыщенности и резкости работает по одной
//! схеме: строится "вырожденное" изображение и результат интерполируется
//! между ним и исходником с заданным коэффициентом. Коэффициент 1.0 всегда
//! возвращает исходное изображение, 0.0 - вырожденное.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;

/// Яркость пикселя по ITU-R BT.601 (как в классическом преобразовании RGB -> L)
pub fn luma(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

/// Перевод в оттенки серого
pub fn to_gray(img: &RgbImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut result = GrayImage::new(width, height);
    for (x, y, p) in img.enumerate_pixels() {
        result.put_pixel(x, y, Luma([luma(p)]));
    }
    result
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn lerp(from: u8, to: u8, t: f32) -> u8 {
    clamp_u8(from as f32 + t * (to as f32 - from as f32))
}

/// Интерполяция `degenerate -> img` с коэффициентом `factor`
fn enhance_from(degenerate: &RgbImage, img: &RgbImage, factor: f32) -> RgbImage {
    blend(degenerate, img, factor)
}

/// Яркость: вырожденное изображение - чёрное
pub fn brightness(img: &RgbImage, factor: f32) -> RgbImage {
    let mut result = img.clone();
    for p in result.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = clamp_u8(*c as f32 * factor);
        }
    }
    result
}

/// Контраст: вырожденное изображение - серое со средней яркостью
pub fn contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img.pixels().map(|p| luma(p) as u64).sum();
    let mean = (sum as f64 / count as f64 + 0.5) as u8;

    let degenerate = RgbImage::from_pixel(img.width(), img.height(), Rgb([mean, mean, mean]));
    enhance_from(&degenerate, img, factor)
}

/// Насыщенность: вырожденное изображение - его же серая версия
pub fn saturation(img: &RgbImage, factor: f32) -> RgbImage {
    let mut degenerate = img.clone();
    for p in degenerate.pixels_mut() {
        let l = luma(p);
        *p = Rgb([l, l, l]);
    }
    enhance_from(&degenerate, img, factor)
}

/// Резкость: вырожденное изображение - сглаженное ядром 3x3
pub fn sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return img.clone();
    }

    // Kernel:
    //  1  1  1
    //  1  5  1   / 13
    //  1  1  1
    let mut smooth = img.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0u32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let weight = if dx == 1 && dy == 1 { 5 } else { 1 };
                    let p = img.get_pixel(x + dx - 1, y + dy - 1).0;
                    for c in 0..3 {
                        acc[c] += p[c] as u32 * weight;
                    }
                }
            }
            smooth.put_pixel(
                x,
                y,
                Rgb([
                    ((acc[0] + 6) / 13) as u8,
                    ((acc[1] + 6) / 13) as u8,
                    ((acc[2] + 6) / 13) as u8,
                ]),
            );
        }
    }

    enhance_from(&smooth, img, factor)
}

/// Линейное смешивание: `a + alpha * (b - a)`
pub fn blend(a: &RgbImage, b: &RgbImage, alpha: f32) -> RgbImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut result = a.clone();
    for (out, pb) in result.pixels_mut().zip(b.pixels()) {
        for c in 0..3 {
            out.0[c] = lerp(out.0[c], pb.0[c], alpha);
        }
    }
    result
}

/// Композиция по маске: 255 -> `a`, 0 -> `b`, линейно между ними
pub fn composite(a: &RgbImage, b: &RgbImage, mask: &GrayImage) -> RgbImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    debug_assert_eq!(a.dimensions(), mask.dimensions());
    let mut result = b.clone();
    for ((out, pa), m) in result.pixels_mut().zip(a.pixels()).zip(mask.pixels()) {
        let t = m.0[0] as f32 / 255.0;
        for c in 0..3 {
            out.0[c] = lerp(out.0[c], pa.0[c], t);
        }
    }
    result
}

/// Гауссово размытие. Радиус <= 0 возвращает копию
pub fn gaussian_blur(img: &RgbImage, radius: f32) -> RgbImage {
    if radius <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, radius)
}

pub fn gaussian_blur_gray(img: &GrayImage, radius: f32) -> GrayImage {
    if radius <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, radius)
}

/// Контраст для маски в оттенках серого
pub fn contrast_gray(img: &GrayImage, factor: f32) -> GrayImage {
    let count = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    let mean = (sum as f64 / count as f64 + 0.5) as u8;

    let mut result = img.clone();
    for p in result.pixels_mut() {
        p.0[0] = lerp(mean, p.0[0], factor);
    }
    result
}

/// Средний цвет изображения
pub fn mean_color(img: &RgbImage) -> Rgb<u8> {
    let count = (img.width() as u64 * img.height() as u64).max(1);
    let mut acc = [0u64; 3];
    for p in img.pixels() {
        for c in 0..3 {
            acc[c] += p.0[c] as u64;
        }
    }
    Rgb([
        (acc[0] as f64 / count as f64).round() as u8,
        (acc[1] as f64 / count as f64).round() as u8,
        (acc[2] as f64 / count as f64).round() as u8,
    ])
}

/// Сглаживание текстуры: смешивание от плоского среднего цвета к исходнику.
/// `texture >= 0.999` оставляет регион как есть
pub fn reduce_texture(region: &RgbImage, texture: f32) -> RgbImage {
    let t = texture.clamp(0.0, 1.0);
    if t >= 0.999 {
        return region.clone();
    }
    let flat = RgbImage::from_pixel(region.width(), region.height(), mean_color(region));
    blend(&flat, region, t)
}

/// Смешивание региона со сплошным цветом
pub fn tint(region: &RgbImage, color: Rgb<u8>, alpha: f32) -> RgbImage {
    if alpha <= 0.0 {
        return region.clone();
    }
    let solid = RgbImage::from_pixel(region.width(), region.height(), color);
    blend(region, &solid, alpha.min(1.0))
}

/// Центральный квадратный кроп
pub fn center_crop_square(img: &RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let side = width.min(height);
    let left = (width - side) / 2;
    let top = (height - side) / 2;
    image::imageops::crop_imm(img, left, top, side, side).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([40, 80, 120])
            } else {
                Rgb([200, 160, 120])
            }
        })
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(&Rgb([255, 255, 255])), 255);
        assert_eq!(luma(&Rgb([0, 0, 0])), 0);
        assert_eq!(luma(&Rgb([255, 0, 0])), 76);
    }

    #[test]
    fn test_brightness_scales_and_clamps() {
        let img = RgbImage::from_pixel(2, 2, Rgb([100, 200, 10]));
        assert_eq!(brightness(&img, 0.5).get_pixel(0, 0).0, [50, 100, 5]);
        assert_eq!(brightness(&img, 2.0).get_pixel(0, 0).0, [200, 255, 20]);
    }

    #[test]
    fn test_identity_factor() {
        let img = checker(8);
        assert_eq!(contrast(&img, 1.0), img);
        assert_eq!(saturation(&img, 1.0), img);
        assert_eq!(sharpness(&img, 1.0), img);
    }

    #[test]
    fn test_contrast_zero_is_flat() {
        let img = checker(8);
        let flat = contrast(&img, 0.0);
        let first = *flat.get_pixel(0, 0);
        assert!(flat.pixels().all(|p| *p == first));
    }

    #[test]
    fn test_saturation_zero_is_gray() {
        let gray = saturation(&checker(4), 0.0);
        assert!(gray.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn test_composite_mask() {
        let a = RgbImage::from_pixel(2, 1, Rgb([255, 255, 255]));
        let b = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([255]));
        let out = composite(&a, &b, &mask);
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_reduce_texture() {
        let img = checker(4);
        assert_eq!(reduce_texture(&img, 1.0), img);
        let flat = reduce_texture(&img, 0.0);
        assert!(flat.pixels().all(|p| *p == Rgb([120, 120, 120])));
    }

    #[test]
    fn test_center_crop() {
        let img = RgbImage::new(30, 10);
        assert_eq!(center_crop_square(&img).dimensions(), (10, 10));
    }

    #[test]
    fn test_blur_zero_radius_is_copy() {
        let img = checker(6);
        assert_eq!(gaussian_blur(&img, 0.0), img);
    }
}

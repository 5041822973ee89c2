//! Классический рендер художественного QR (без нейросети)
//!
//! Фон разбивается на модули QR: под тёмными модулями картинка затемняется,
//! под светлыми - осветляется. Finder patterns по умолчанию рисуются чистым
//! чёрным/белым, иначе сканеры плохо находят код.

use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::enhance;
use crate::matrix::QrMatrix;
use crate::ArtError;

/// Режим смешивания модулей
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Жёсткие границы модулей
    #[default]
    Sharp,
    /// Размытая маска без сетки
    Organic,
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sharp" => Ok(Self::Sharp),
            "organic" => Ok(Self::Organic),
            other => Err(format!("unknown blend mode: {other}")),
        }
    }
}

/// Стиль рендера
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Доля цвета тёмных модулей (0-1)
    pub dark_alpha: f32,
    /// Доля цвета светлых модулей (0-1)
    pub light_alpha: f32,
    /// Радиус скругления углов в пикселях
    pub rounded_radius: u32,
    /// Рисовать finder patterns чистым ч/б
    pub preserve_finders: bool,
    /// Сила принудительного затемнения/осветления (0-1)
    pub strength: f32,
    /// Сохранение текстуры фона (0-1)
    pub texture: f32,
    pub mode: BlendMode,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            dark_alpha: 0.62,
            light_alpha: 0.18,
            rounded_radius: 36,
            preserve_finders: true,
            strength: 1.0,
            texture: 0.85,
            mode: BlendMode::Sharp,
        }
    }
}

impl Style {
    /// Приведение всех коэффициентов к диапазону 0-1
    pub fn clamped(self) -> Self {
        Self {
            dark_alpha: clamp01(self.dark_alpha),
            light_alpha: clamp01(self.light_alpha),
            strength: clamp01(self.strength),
            texture: clamp01(self.texture),
            ..self
        }
    }
}

/// Параметры классического рендера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicOptions {
    /// Желаемый размер стороны в пикселях (фактический кратен числу модулей)
    pub out_size: u32,
    /// Тихая зона в модулях
    pub border_modules: usize,
    pub dark_color: [u8; 3],
    pub light_color: [u8; 3],
    pub style: Style,
}

impl Default for ClassicOptions {
    fn default() -> Self {
        Self {
            out_size: 1024,
            border_modules: 4,
            dark_color: [0, 0, 0],
            light_color: [255, 255, 255],
            style: Style::default(),
        }
    }
}

pub fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Разбор цвета в формате `#RRGGBB` или `#RGB`
pub fn parse_color(color: &str) -> Result<[u8; 3], ArtError> {
    let value = color.trim().trim_start_matches('#');
    let expanded: String = match value.len() {
        3 => value.chars().flat_map(|c| [c, c]).collect(),
        6 => value.to_string(),
        _ => return Err(ArtError::InvalidColor(color.to_string())),
    };

    let channel = |i: usize| {
        expanded
            .get(i..i + 2)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .ok_or_else(|| ArtError::InvalidColor(color.to_string()))
    };

    Ok([channel(0)?, channel(2)?, channel(4)?])
}

/// Коэффициенты яркости для тёмных и светлых модулей
#[derive(Debug, Clone, Copy)]
struct ModuleMapping {
    dark_factor: f32,
    light_factor: f32,
    dark_color: Rgb<u8>,
    light_color: Rgb<u8>,
    style: Style,
}

impl ModuleMapping {
    fn new(options: &ClassicOptions, style: Style) -> Self {
        Self {
            dark_factor: 0.35 + (1.0 - style.strength) * 0.3,
            light_factor: 1.65 + (style.strength - 0.5) * 0.5,
            dark_color: Rgb(options.dark_color),
            light_color: Rgb(options.light_color),
            style,
        }
    }

    fn apply(&self, region: &RgbImage, dark: bool) -> RgbImage {
        let mapped = if dark {
            let r = enhance::brightness(region, self.dark_factor);
            enhance::contrast(&r, 1.1)
        } else {
            let r = enhance::brightness(region, self.light_factor);
            enhance::saturation(&r, 0.9)
        };

        let textured = enhance::reduce_texture(&mapped, self.style.texture);
        if dark {
            enhance::tint(&textured, self.dark_color, self.style.dark_alpha)
        } else {
            enhance::tint(&textured, self.light_color, self.style.light_alpha)
        }
    }
}

/// Рендер художественного QR поверх фона (или градиентной заглушки)
pub fn render_art_qr(
    data: &str,
    background: Option<&DynamicImage>,
    options: &ClassicOptions,
) -> Result<DynamicImage, ArtError> {
    let matrix = QrMatrix::encode(data, options.border_modules)?;
    let modules = matrix.width();

    let module_px = options.out_size / modules as u32;
    if module_px == 0 {
        return Err(ArtError::OutputTooSmall {
            size: options.out_size,
            modules,
        });
    }
    let size = module_px * modules as u32;
    let style = options.style.clamped();

    log::info!(
        "Classic render: {} modules, {}px per module, mode {:?}",
        modules,
        module_px,
        style.mode
    );

    let bg = match background {
        Some(img) => {
            let cropped = enhance::center_crop_square(&img.to_rgb8());
            imageops::resize(&cropped, size, size, FilterType::Lanczos3)
        }
        None => placeholder_background(size),
    };
    let bg = enhance::saturation(&bg, 1.25);
    let bg = enhance::contrast(&bg, 1.08);
    let base = enhance::gaussian_blur(&bg, 0.5);

    let mapping = ModuleMapping::new(options, style);
    let mut canvas = match style.mode {
        BlendMode::Sharp => map_modules_sharp(&base, &matrix, module_px, &mapping),
        BlendMode::Organic => map_modules_organic(&base, &matrix, module_px, &mapping),
    };

    if style.preserve_finders {
        lock_finders(&mut canvas, &matrix, module_px);
    }

    if style.rounded_radius > 0 {
        let mask = rounded_mask(size, style.rounded_radius);
        let mut rgba = DynamicImage::ImageRgb8(canvas).to_rgba8();
        for (p, m) in rgba.pixels_mut().zip(mask.pixels()) {
            p.0[3] = m.0[0];
        }
        return Ok(DynamicImage::ImageRgba8(rgba));
    }

    Ok(DynamicImage::ImageRgb8(canvas))
}

fn module_origin(mx: usize, my: usize, module_px: u32) -> (u32, u32) {
    (mx as u32 * module_px, my as u32 * module_px)
}

fn map_modules_sharp(
    base: &RgbImage,
    matrix: &QrMatrix,
    module_px: u32,
    mapping: &ModuleMapping,
) -> RgbImage {
    let mut canvas = base.clone();
    let modules = matrix.width();

    for my in 0..modules {
        for mx in 0..modules {
            let (x0, y0) = module_origin(mx, my, module_px);
            let region = imageops::crop_imm(base, x0, y0, module_px, module_px).to_image();
            let mapped = mapping.apply(&region, matrix.is_dark(mx, my));
            imageops::replace(&mut canvas, &mapped, x0 as i64, y0 as i64);
        }
    }

    canvas
}

/// Organic: обе версии каждого модуля смешиваются через размытую маску,
/// чтобы не было видно сетки
fn map_modules_organic(
    base: &RgbImage,
    matrix: &QrMatrix,
    module_px: u32,
    mapping: &ModuleMapping,
) -> RgbImage {
    let mut dark_layer = base.clone();
    let mut light_layer = base.clone();
    let modules = matrix.width();

    for my in 0..modules {
        for mx in 0..modules {
            let (x0, y0) = module_origin(mx, my, module_px);
            let region = imageops::crop_imm(base, x0, y0, module_px, module_px).to_image();
            imageops::replace(&mut dark_layer, &mapping.apply(&region, true), x0 as i64, y0 as i64);
            imageops::replace(&mut light_layer, &mapping.apply(&region, false), x0 as i64, y0 as i64);
        }
    }

    let mask = soft_mask(matrix, module_px);
    enhance::composite(&light_layer, &dark_layer, &mask)
}

/// Маска: тёмные модули 0, светлые 255, края размыты на ~0.3 модуля
fn soft_mask(matrix: &QrMatrix, module_px: u32) -> GrayImage {
    let modules = matrix.width();
    let size = module_px * modules as u32;
    let mut mask = GrayImage::from_pixel(size, size, Luma([255]));

    for my in 0..modules {
        for mx in 0..modules {
            if !matrix.is_dark(mx, my) {
                continue;
            }
            let (x0, y0) = module_origin(mx, my, module_px);
            for dy in 0..module_px {
                for dx in 0..module_px {
                    mask.put_pixel(x0 + dx, y0 + dy, Luma([0]));
                }
            }
        }
    }

    // Wider blur erases isolated dark modules
    let radius = (module_px as f32 * 0.3).max(1.0);
    let mask = enhance::gaussian_blur_gray(&mask, radius);
    enhance::contrast_gray(&mask, 1.5)
}

fn lock_finders(canvas: &mut RgbImage, matrix: &QrMatrix, module_px: u32) {
    let modules = matrix.width();
    for my in 0..modules {
        for mx in 0..modules {
            if !matrix.is_finder_or_separator(mx, my) {
                continue;
            }
            let color = if matrix.is_dark(mx, my) {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            };
            let (x0, y0) = module_origin(mx, my, module_px);
            for dy in 0..module_px {
                for dx in 0..module_px {
                    canvas.put_pixel(x0 + dx, y0 + dy, color);
                }
            }
        }
    }
}

/// Заглушка фона: вертикальный зелёный градиент
fn placeholder_background(size: u32) -> RgbImage {
    let span = size.saturating_sub(1).max(1) as f32;
    let img = RgbImage::from_fn(size, size, |_, y| {
        let t = y as f32 / span;
        Rgb([
            (20.0 + 30.0 * t) as u8,
            (70.0 + 120.0 * t) as u8,
            (25.0 + 35.0 * t) as u8,
        ])
    });
    enhance::gaussian_blur(&img, (size / 320).max(1) as f32)
}

/// Маска скруглённого квадрата
fn rounded_mask(size: u32, radius: u32) -> GrayImage {
    // r <= max - r keeps the clamp range valid for even sides
    let r = radius.min(size.saturating_sub(1) / 2) as f32;
    let max = (size - 1) as f32;

    GrayImage::from_fn(size, size, |x, y| {
        let (x, y) = (x as f32, y as f32);
        let cx = x.clamp(r, max - r);
        let cy = y.clamp(r, max - r);
        let (dx, dy) = (x - cx, y - cy);
        if dx * dx + dy * dy <= r * r {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Прозрачная маска, на которой нарисованы только finder patterns
/// (и их разделители) чистым чёрным/белым
pub fn finder_mask(data: &str, size: u32, border: usize) -> Result<RgbaImage, ArtError> {
    let matrix = QrMatrix::encode(data, border)?;
    let modules = matrix.width();
    let module_px = size / modules as u32;
    if module_px == 0 {
        return Err(ArtError::OutputTooSmall { size, modules });
    }
    let real_size = module_px * modules as u32;

    let mut mask = RgbaImage::from_pixel(real_size, real_size, Rgba([0, 0, 0, 0]));
    for my in 0..modules {
        for mx in 0..modules {
            if !matrix.is_finder_or_separator(mx, my) {
                continue;
            }
            let color = if matrix.is_dark(mx, my) {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            };
            let (x0, y0) = module_origin(mx, my, module_px);
            for dy in 0..module_px {
                for dx in 0..module_px {
                    mask.put_pixel(x0 + dx, y0 + dy, color);
                }
            }
        }
    }

    if real_size != size {
        mask = imageops::resize(&mask, size, size, FilterType::Nearest);
    }

    Ok(mask)
}

//! Модуль построения матрицы QR-кода
//!
//! Кодирование всегда идёт с уровнем коррекции H: художественная обработка
//! портит часть модулей, и запас в ~30% нужен, чтобы код оставался читаемым.

use image::{Rgb, RgbImage};
use qrcode::{Color, EcLevel, QrCode};

use crate::ArtError;

/// Размер finder pattern в модулях
const FINDER_SIZE: i64 = 7;
/// Ширина разделителя вокруг finder pattern
const SEPARATOR: i64 = 1;

/// Матрица модулей QR-кода с тихой зоной
#[derive(Debug, Clone)]
pub struct QrMatrix {
    modules: Vec<bool>,
    width: usize,
    border: usize,
}

impl QrMatrix {
    /// Кодирование данных (EC level H, минимальная подходящая версия)
    /// и добавление `border` светлых модулей по периметру
    pub fn encode(data: &str, border: usize) -> Result<Self, ArtError> {
        if data.is_empty() {
            return Err(ArtError::EmptyData);
        }

        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
            .map_err(|e| ArtError::Encode(e.to_string()))?;
        let symbol = code.width();
        let width = symbol + 2 * border;

        let mut modules = vec![false; width * width];
        for y in 0..symbol {
            for x in 0..symbol {
                if code[(x, y)] == Color::Dark {
                    modules[(y + border) * width + x + border] = true;
                }
            }
        }

        log::debug!(
            "Encoded {} bytes into {}x{} symbol (border {})",
            data.len(),
            symbol,
            symbol,
            border
        );

        Ok(Self { modules, width, border })
    }

    /// Ширина матрицы в модулях, включая тихую зону
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn border(&self) -> usize {
        self.border
    }

    /// Тёмный ли модуль (x, y)
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.modules[y * self.width + x]
    }

    /// Принадлежит ли модуль одному из трёх finder pattern или их разделителю.
    ///
    /// Квадраты 9x9 (7x7 + кольцо разделителя) могут выходить за пределы
    /// матрицы при нулевой тихой зоне, поэтому считаем в знаковых координатах.
    pub fn is_finder_or_separator(&self, x: usize, y: usize) -> bool {
        let n = self.width as i64;
        let border = self.border as i64;
        let (x, y) = (x as i64, y as i64);
        let size = FINDER_SIZE + 2 * SEPARATOR;

        let near = border - SEPARATOR;
        let far = (n - border) - FINDER_SIZE - SEPARATOR;

        in_square(x, y, near, near, size)
            || in_square(x, y, far, near, size)
            || in_square(x, y, near, far, size)
    }

    /// Управляющее изображение для ControlNet: чёрные модули на белом,
    /// `box_size` пикселей на модуль
    pub fn control_image(&self, box_size: u32) -> RgbImage {
        let side = self.width as u32 * box_size;
        let mut img = RgbImage::from_pixel(side, side, Rgb([255, 255, 255]));

        for my in 0..self.width {
            for mx in 0..self.width {
                if !self.is_dark(mx, my) {
                    continue;
                }
                let x0 = mx as u32 * box_size;
                let y0 = my as u32 * box_size;
                for dy in 0..box_size {
                    for dx in 0..box_size {
                        img.put_pixel(x0 + dx, y0 + dy, Rgb([0, 0, 0]));
                    }
                }
            }
        }

        img
    }
}

fn in_square(x: i64, y: i64, left: i64, top: i64, size: i64) -> bool {
    left <= x && x < left + size && top <= y && y < top + size
}

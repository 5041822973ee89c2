//! QR Art Core - генерация художественных QR-кодов
//!
//! Библиотека для создания сканируемых QR-кодов в виде изображений:
//! - Классический рендер поверх фоновой картинки (без нейросети)
//! - Анализ промпта и подбор параметров ControlNet ("Smart Adaptive Engine")
//! - Генерация через внешний Stable Diffusion + ControlNet бэкенд
//! - Постобработка, усиливающая структуру QR
//! - Проверка читаемости результата через rqrr / rxing

pub mod analyzer;
pub mod backend;
pub mod classic;
pub mod engine;
pub mod enhance;
pub mod matrix;
pub mod plan;
pub mod postprocess;
pub mod prompt;
pub mod verify;

pub use analyzer::{analyze_prompt, SmartSettings, SubjectKind};
pub use backend::{
    BackendError, DiffusionBackend, DiffusionRequest, NoProgress, ProgressObserver, WebUiBackend,
    WebUiConfig,
};
pub use classic::{finder_mask, parse_color, render_art_qr, BlendMode, ClassicOptions, Style};
pub use engine::{ArtEngine, ArtOutput, EngineConfig};
pub use matrix::QrMatrix;
pub use plan::{AiRequest, GenerationPlan, PerformanceMode, Readability, DEFAULT_CN_SCALE};
pub use verify::{DecodedQr, ScanVerifier, VerifyError};

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

/// Основные ошибки модуля
#[derive(Error, Debug)]
pub enum ArtError {
    #[error("QR data must not be empty")]
    EmptyData,

    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("Output size {size}px is too small for a {modules}x{modules} QR")]
    OutputTooSmall { size: u32, modules: usize },

    #[error("Color must be #RRGGBB or #RGB, got {0:?}")]
    InvalidColor(String),

    #[error("Prompt is required for AI mode")]
    MissingPrompt,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Generation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Кодирование изображения в PNG
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ArtError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

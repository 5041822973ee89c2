//! Внешний бэкенд диффузии
//!
//! Сама диффузия (Stable Diffusion + ControlNet "QR Code Monster") живёт во
//! внешнем сервисе. Здесь только контракт
//! `generate(control image, prompt, params) -> image` и его HTTP-реализация.

mod webui;

pub use webui::{WebUiBackend, WebUiConfig};

use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

use crate::plan::{GenerationPlan, PerformanceMode};

/// Ошибки бэкенда
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Generation cancelled")]
    Cancelled,

    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend returned no image")]
    EmptyResult,

    #[error("Invalid image payload: {0}")]
    InvalidPayload(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Параметры одного вызова диффузии
#[derive(Debug, Clone)]
pub struct DiffusionRequest {
    /// Управляющее изображение QR (чёрное на белом)
    pub control_image: RgbImage,
    pub prompt: String,
    pub negative_prompt: String,
    /// controlnet_conditioning_scale
    pub cn_scale: f32,
    pub guidance_scale: f32,
    pub control_start: f32,
    pub control_end: f32,
    pub steps: u32,
    /// -1 - случайный
    pub seed: i64,
    pub performance: PerformanceMode,
}

impl DiffusionRequest {
    pub fn from_plan(
        plan: &GenerationPlan,
        control_image: RgbImage,
        seed: i64,
        performance: PerformanceMode,
    ) -> Self {
        Self {
            control_image,
            prompt: plan.prompt.clone(),
            negative_prompt: plan.negative_prompt.clone(),
            cn_scale: plan.cn_scale,
            guidance_scale: plan.guidance_scale,
            control_start: plan.control_start,
            control_end: plan.control_end,
            steps: plan.steps,
            seed,
            performance,
        }
    }
}

/// Наблюдатель за прогрессом шагов денойзинга
pub trait ProgressObserver: Send + Sync {
    /// Завершён шаг `step` из `total`
    fn on_step(&self, step: u32, total: u32);

    /// Запрошена ли отмена
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Наблюдатель, который ничего не делает (синхронная генерация)
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_step(&self, _step: u32, _total: u32) {}
}

/// Бэкенд генерации изображений
#[async_trait]
pub trait DiffusionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: &DiffusionRequest,
        progress: &dyn ProgressObserver,
    ) -> Result<RgbImage, BackendError>;
}

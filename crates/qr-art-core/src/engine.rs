//! Движок генерации
//!
//! Связывает все этапы: матрица QR -> управляющее изображение -> план ->
//! внешний бэкенд -> постобработка -> проверка читаемости -> PNG.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, DiffusionBackend, DiffusionRequest, ProgressObserver};
use crate::classic::{render_art_qr, ClassicOptions};
use crate::matrix::QrMatrix;
use crate::plan::{AiRequest, GenerationPlan};
use crate::postprocess;
use crate::verify::ScanVerifier;
use crate::{encode_png, ArtError};

/// Конфигурация движка
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Пикселей на модуль в управляющем изображении
    pub control_box_size: u32,
    /// Проверять читаемость результата декодером
    pub verify_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_box_size: 10,
            verify_output: true,
        }
    }
}

/// Готовый результат
#[derive(Debug, Clone)]
pub struct ArtOutput {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `None` - проверка отключена
    pub scannable: Option<bool>,
    /// План AI-генерации (для классического режима `None`)
    pub plan: Option<GenerationPlan>,
}

impl ArtOutput {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.png)
    }
}

/// Движок генерации художественных QR
pub struct ArtEngine {
    backend: Arc<dyn DiffusionBackend>,
    config: EngineConfig,
}

impl ArtEngine {
    pub fn new(backend: Arc<dyn DiffusionBackend>, config: EngineConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// AI-генерация через ControlNet
    pub async fn generate_ai(
        &self,
        request: &AiRequest,
        progress: &dyn ProgressObserver,
    ) -> Result<ArtOutput, ArtError> {
        request.validate()?;

        // Zero quiet zone: the pattern should fill the whole canvas
        let matrix = QrMatrix::encode(&request.data, 0)?;
        let control = matrix.control_image(self.config.control_box_size);
        let plan = GenerationPlan::build(request);

        log::info!(
            "AI generation via {}: readability {}, {} steps, cn {:.2}, blend {:.2}",
            self.backend.name(),
            request.readability.as_str(),
            plan.steps,
            plan.cn_scale,
            plan.blend_opacity
        );

        let diffusion =
            DiffusionRequest::from_plan(&plan, control.clone(), request.seed, request.performance);
        let generated = self.backend.generate(&diffusion, progress).await?;

        if progress.is_cancelled() {
            return Err(BackendError::Cancelled.into());
        }

        let data = request.data.clone();
        let verify = self.config.verify_output;
        let output = tokio::task::spawn_blocking(move || {
            let img = finish_ai_image(generated, &control, &data, &plan);
            finalize(DynamicImage::ImageRgb8(img), &data, verify, Some(plan))
        })
        .await
        .map_err(|e| ArtError::Worker(e.to_string()))??;

        Ok(output)
    }

    /// Классический рендер без нейросети
    pub fn render_classic(
        &self,
        data: &str,
        background: Option<&DynamicImage>,
        options: &ClassicOptions,
    ) -> Result<ArtOutput, ArtError> {
        let img = render_art_qr(data, background, options)?;
        finalize(img, data, self.config.verify_output, None)
    }
}

/// Постобработка сгенерированного изображения по плану
pub fn finish_ai_image(
    generated: RgbImage,
    control: &RgbImage,
    data: &str,
    plan: &GenerationPlan,
) -> RgbImage {
    let mut img = generated;

    if let Some(boost) = plan.boost {
        img = postprocess::boost(&img, boost);
    }

    if plan.blend_opacity > 0.0 {
        img = postprocess::blend_qr_contrast(&img, control, data, plan.blend_opacity);
    }

    img
}

fn finalize(
    img: DynamicImage,
    data: &str,
    verify: bool,
    plan: Option<GenerationPlan>,
) -> Result<ArtOutput, ArtError> {
    let scannable = if verify {
        match ScanVerifier::new().verify(&img, data) {
            Ok(_) => Some(true),
            Err(e) => {
                log::warn!("Generated QR failed verification: {}", e);
                Some(false)
            }
        }
    } else {
        None
    };

    let png = encode_png(&img)?;
    Ok(ArtOutput {
        png,
        width: img.width(),
        height: img.height(),
        scannable,
        plan,
    })
}

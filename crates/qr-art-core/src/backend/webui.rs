//! Бэкенд на HTTP API AUTOMATIC1111 WebUI с расширением ControlNet
//!
//! - `POST /sdapi/v1/txt2img` - генерация, ControlNet через always-on script
//! - `GET /sdapi/v1/progress` - текущий шаг, опрашивается во время генерации
//! - `POST /sdapi/v1/interrupt` - отмена

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{BackendError, DiffusionBackend, DiffusionRequest, ProgressObserver};
use crate::plan::PerformanceMode;

/// Настройки WebUI бэкенда
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebUiConfig {
    /// Базовый URL, например `http://127.0.0.1:7860`
    pub base_url: String,
    /// Имя модели ControlNet в WebUI
    pub controlnet_model: String,
    /// Чекпойнт Stable Diffusion; `None` - текущий в WebUI
    pub checkpoint: Option<String>,
    pub sampler: String,
    pub width: u32,
    pub height: u32,
    /// Интервал опроса прогресса
    pub poll_interval_ms: u64,
    /// Общий таймаут запроса генерации
    pub timeout_secs: u64,
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7860".to_string(),
            controlnet_model: "control_v1p_sd15_qrcode_monster".to_string(),
            checkpoint: None,
            // DPM++ 2M Karras keeps quality at low step counts
            sampler: "DPM++ 2M Karras".to_string(),
            width: 512,
            height: 512,
            poll_interval_ms: 500,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Serialize)]
struct Txt2ImgPayload<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    steps: u32,
    cfg_scale: f32,
    width: u32,
    height: u32,
    seed: i64,
    sampler_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_settings: Option<OverrideSettings<'a>>,
    alwayson_scripts: AlwaysOnScripts<'a>,
}

#[derive(Debug, Serialize)]
struct OverrideSettings<'a> {
    sd_model_checkpoint: &'a str,
}

#[derive(Debug, Serialize)]
struct AlwaysOnScripts<'a> {
    controlnet: ControlNetScript<'a>,
}

#[derive(Debug, Serialize)]
struct ControlNetScript<'a> {
    args: Vec<ControlNetUnit<'a>>,
}

#[derive(Debug, Serialize)]
struct ControlNetUnit<'a> {
    enabled: bool,
    image: String,
    module: &'a str,
    model: &'a str,
    weight: f32,
    guidance_start: f32,
    guidance_end: f32,
    low_vram: bool,
    pixel_perfect: bool,
    resize_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProgressResponse {
    state: ProgressState,
}

#[derive(Debug, Deserialize)]
struct ProgressState {
    #[serde(default)]
    sampling_step: u32,
    #[serde(default)]
    sampling_steps: u32,
}

/// Клиент WebUI
pub struct WebUiBackend {
    client: Client,
    config: WebUiConfig,
}

impl WebUiBackend {
    pub fn new(config: WebUiConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn encode_control(&self, control: &RgbImage) -> Result<String, BackendError> {
        let resized = imageops::resize(
            control,
            self.config.width,
            self.config.height,
            FilterType::Lanczos3,
        );
        let mut buf = Cursor::new(Vec::new());
        resized.write_to(&mut buf, ImageFormat::Png)?;
        Ok(STANDARD.encode(buf.into_inner()))
    }

    fn payload<'a>(&'a self, request: &'a DiffusionRequest, control_b64: String) -> Txt2ImgPayload<'a> {
        Txt2ImgPayload {
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            steps: request.steps,
            cfg_scale: request.guidance_scale,
            width: self.config.width,
            height: self.config.height,
            seed: request.seed,
            sampler_name: &self.config.sampler,
            override_settings: self
                .config
                .checkpoint
                .as_deref()
                .map(|checkpoint| OverrideSettings { sd_model_checkpoint: checkpoint }),
            alwayson_scripts: AlwaysOnScripts {
                controlnet: ControlNetScript {
                    args: vec![ControlNetUnit {
                        enabled: true,
                        image: control_b64,
                        module: "none",
                        model: &self.config.controlnet_model,
                        weight: request.cn_scale,
                        guidance_start: request.control_start,
                        guidance_end: request.control_end,
                        low_vram: request.performance == PerformanceMode::Eco,
                        pixel_perfect: false,
                        resize_mode: "Just Resize",
                    }],
                },
            },
        }
    }

    async fn poll_progress(&self) -> Result<Option<(u32, u32)>, BackendError> {
        let response = self
            .client
            .get(self.url("/sdapi/v1/progress"))
            .query(&[("skip_current_image", "true")])
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?;
        let progress: ProgressResponse = response.json().await?;

        if progress.state.sampling_steps == 0 {
            return Ok(None);
        }
        Ok(Some((progress.state.sampling_step, progress.state.sampling_steps)))
    }

    async fn interrupt(&self) {
        let result = self
            .client
            .post(self.url("/sdapi/v1/interrupt"))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        if let Err(e) = result {
            log::warn!("WebUI interrupt failed: {}", e);
        }
    }
}

/// Разбор base64 (допускается префикс data URL)
fn decode_image(payload: &str) -> Result<RgbImage, BackendError> {
    let raw = match payload.split_once("base64,") {
        Some((_, data)) => data,
        None => payload,
    };
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| BackendError::InvalidPayload(e.to_string()))?;
    Ok(image::load_from_memory(&bytes)?.to_rgb8())
}

#[async_trait]
impl DiffusionBackend for WebUiBackend {
    fn name(&self) -> &str {
        "webui"
    }

    async fn generate(
        &self,
        request: &DiffusionRequest,
        progress: &dyn ProgressObserver,
    ) -> Result<RgbImage, BackendError> {
        let control_b64 = self.encode_control(&request.control_image)?;
        let payload = self.payload(request, control_b64);

        log::info!(
            "WebUI txt2img: {} steps, cn {:.2}, cfg {:.1}, seed {}, {:?}",
            request.steps,
            request.cn_scale,
            request.guidance_scale,
            request.seed,
            request.performance
        );

        let send = self.client.post(self.url("/sdapi/v1/txt2img")).json(&payload).send();
        tokio::pin!(send);

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        let response = loop {
            tokio::select! {
                result = &mut send => break result?,
                _ = ticker.tick() => {
                    if progress.is_cancelled() {
                        log::info!("Cancellation requested, interrupting WebUI");
                        self.interrupt().await;
                        return Err(BackendError::Cancelled);
                    }
                    match self.poll_progress().await {
                        Ok(Some((step, total))) => progress.on_step(step, total),
                        Ok(None) => {}
                        Err(e) => log::debug!("Progress poll failed: {}", e),
                    }
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Txt2ImgResponse = response.json().await?;
        // ControlNet appends its detected maps after the generated image
        let first = body.images.first().ok_or(BackendError::EmptyResult)?;
        let image = decode_image(first)?;

        progress.on_step(request.steps, request.steps);
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::QrMatrix;

    fn request() -> DiffusionRequest {
        DiffusionRequest {
            control_image: QrMatrix::encode("hello", 0).unwrap().control_image(10),
            prompt: "forest".into(),
            negative_prompt: "ugly".into(),
            cn_scale: 1.65,
            guidance_scale: 7.5,
            control_start: 0.0,
            control_end: 1.0,
            steps: 40,
            seed: -1,
            performance: PerformanceMode::Eco,
        }
    }

    #[test]
    fn test_payload_shape() {
        let backend = WebUiBackend::new(WebUiConfig {
            checkpoint: Some("realisticVision.safetensors".into()),
            ..WebUiConfig::default()
        })
        .unwrap();
        let req = request();
        let json = serde_json::to_value(backend.payload(&req, "AAAA".into())).unwrap();

        assert_eq!(json["steps"], 40);
        assert_eq!(json["sampler_name"], "DPM++ 2M Karras");
        assert_eq!(json["override_settings"]["sd_model_checkpoint"], "realisticVision.safetensors");
        let unit = &json["alwayson_scripts"]["controlnet"]["args"][0];
        assert_eq!(unit["model"], "control_v1p_sd15_qrcode_monster");
        assert_eq!(unit["image"], "AAAA");
        assert_eq!(unit["low_vram"], true);
    }

    #[test]
    fn test_payload_without_checkpoint() {
        let backend = WebUiBackend::new(WebUiConfig::default()).unwrap();
        let req = request();
        let json = serde_json::to_value(backend.payload(&req, String::new())).unwrap();
        assert!(json.get("override_settings").is_none());
    }

    #[test]
    fn test_decode_image_data_url() {
        let img = RgbImage::new(3, 3);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        let b64 = STANDARD.encode(buf.into_inner());

        assert_eq!(decode_image(&b64).unwrap().dimensions(), (3, 3));
        let url = format!("data:image/png;base64,{b64}");
        assert_eq!(decode_image(&url).unwrap().dimensions(), (3, 3));
        assert!(matches!(decode_image("%%%"), Err(BackendError::InvalidPayload(_))));
    }

    #[test]
    fn test_url_join() {
        let backend = WebUiBackend::new(WebUiConfig {
            base_url: "http://host:7860/".into(),
            ..WebUiConfig::default()
        })
        .unwrap();
        assert_eq!(backend.url("/sdapi/v1/txt2img"), "http://host:7860/sdapi/v1/txt2img");
    }
}

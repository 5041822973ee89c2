//! Разбор формы генерации (multipart)

use std::collections::BTreeMap;
use std::str::FromStr;

use axum::extract::Multipart;
use qr_art_core::classic::clamp01;
use qr_art_core::{
    parse_color, AiRequest, ArtError, BlendMode, ClassicOptions, PerformanceMode, Readability,
    Style, DEFAULT_CN_SCALE,
};

use crate::error::ServerError;

const UPLOAD_FIELD: &str = "image";

/// Сырые поля формы и загруженный фон
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: BTreeMap<String, String>,
    pub upload: Option<Vec<u8>>,
}

impl FormData {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == UPLOAD_FIELD {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.upload = Some(bytes.to_vec());
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ServerError> {
        match self.get(name) {
            Some(raw) => raw.parse().map_err(|_| ServerError::InvalidField {
                field: name,
                value: raw.to_string(),
            }),
            None => Ok(default),
        }
    }
}

/// Режим генерации
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ai,
    Classic(BlendMode),
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Ai => "ai",
            Mode::Classic(BlendMode::Sharp) => "sharp",
            Mode::Classic(BlendMode::Organic) => "organic",
        }
    }
}

/// Значения формы после разбора и ограничения диапазонов
#[derive(Debug, Clone, PartialEq)]
pub struct FormValues {
    pub data: String,
    pub size: u32,
    pub border: usize,
    pub dark: String,
    pub light: String,
    pub dark_alpha: f32,
    pub light_alpha: f32,
    pub rounded: u32,
    pub preserve_finders: bool,
    pub strength: f32,
    pub texture: f32,
    pub mode: Mode,
    pub readability: Readability,
    pub prompt: String,
    pub negative_prompt: String,
    pub cn_scale: f32,
    pub guidance_scale: f32,
    pub control_end: f32,
    pub seed: i64,
    pub performance: PerformanceMode,
}

impl FormValues {
    /// Значения стартовой страницы
    pub fn initial() -> Self {
        Self {
            data: "https://aserehe.com".to_string(),
            size: 1024,
            border: 4,
            dark: "#000000".to_string(),
            light: "#ffffff".to_string(),
            dark_alpha: 0.50,
            light_alpha: 0.10,
            rounded: 44,
            preserve_finders: true,
            strength: 1.1,
            texture: 1.0,
            mode: Mode::Classic(BlendMode::Organic),
            readability: Readability::Balanced,
            prompt: String::new(),
            negative_prompt: "ugly, blurry, low quality".to_string(),
            cn_scale: DEFAULT_CN_SCALE,
            guidance_scale: 7.5,
            control_end: 1.0,
            seed: -1,
            performance: PerformanceMode::Balanced,
        }
    }

    pub fn from_form(form: &FormData) -> Result<Self, ServerError> {
        let mode = match form.get("mode") {
            Some("ai") => Mode::Ai,
            Some("sharp") => Mode::Classic(BlendMode::Sharp),
            Some("organic") => Mode::Classic(BlendMode::Organic),
            _ => Mode::Classic(
                form.get("classic_mode")
                    .and_then(|m| m.parse().ok())
                    .unwrap_or(BlendMode::Organic),
            ),
        };

        let size: i64 = form.parse("size", 1024)?;
        let border: i64 = form.parse("border", 4)?;
        let rounded: i64 = form.parse("rounded", 44)?;
        let control_end: f32 = form.parse("control_end", 1.0)?;

        Ok(Self {
            data: form.get("data").unwrap_or_default().to_string(),
            size: size.clamp(256, 2048) as u32,
            border: border.clamp(0, 10) as usize,
            dark: form.get("dark").unwrap_or("#000000").to_string(),
            light: form.get("light").unwrap_or("#ffffff").to_string(),
            dark_alpha: clamp01(form.parse("dark_alpha", 0.42)?),
            light_alpha: clamp01(form.parse("light_alpha", 0.06)?),
            rounded: rounded.clamp(0, 1024) as u32,
            preserve_finders: form.get("preserve_finders").is_some(),
            strength: clamp01(form.parse("strength", 1.0)?),
            texture: clamp01(form.parse("texture", 0.85)?),
            mode,
            readability: form.parse("readability", Readability::Balanced)?,
            prompt: form.get("prompt").unwrap_or_default().to_string(),
            negative_prompt: form.get("negative_prompt").unwrap_or_default().to_string(),
            cn_scale: form.parse("cn_scale", DEFAULT_CN_SCALE)?,
            guidance_scale: form.parse("guidance_scale", 7.5)?,
            control_end: clamp01(control_end),
            seed: form.parse("seed", -1)?,
            performance: form.parse("performance_mode", PerformanceMode::Balanced)?,
        })
    }

    pub fn classic_options(&self) -> Result<ClassicOptions, ArtError> {
        let mode = match self.mode {
            Mode::Classic(mode) => mode,
            Mode::Ai => BlendMode::default(),
        };
        Ok(ClassicOptions {
            out_size: self.size,
            border_modules: self.border,
            dark_color: parse_color(&self.dark)?,
            light_color: parse_color(&self.light)?,
            style: Style {
                dark_alpha: self.dark_alpha,
                light_alpha: self.light_alpha,
                rounded_radius: self.rounded,
                preserve_finders: self.preserve_finders,
                strength: self.strength,
                texture: self.texture,
                mode,
            },
        })
    }

    pub fn ai_request(&self) -> AiRequest {
        AiRequest {
            data: self.data.clone(),
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            readability: self.readability,
            cn_scale: AiRequest::cn_scale_from_form(self.cn_scale),
            guidance_scale: self.guidance_scale,
            control_end: self.control_end,
            seed: self.seed,
            performance: self.performance,
        }
    }

    /// AI с seed -1 каждый раз даёт новую картинку
    pub fn is_deterministic(&self) -> bool {
        self.mode != Mode::Ai || self.seed >= 0
    }
}

//! Планирование генерации по режиму читаемости
//!
//! Режим определяет, насколько сильно QR будет "проявлен" в картинке:
//! - Hidden: Smart Adaptive Engine, структура прячется в сюжете;
//! - Balanced: лёгкий пост-бленд;
//! - Scannable: сильный пост-бленд, код читается почти всегда.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analyzer::{analyze_prompt, SmartSettings, SubjectKind};
use crate::prompt::{self, PromptBuilder};
use crate::ArtError;

/// Значение controlnet scale в форме по умолчанию. Если пользователь его
/// не менял, в Hidden режиме используется значение анализатора.
pub const DEFAULT_CN_SCALE: f32 = 1.35;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;

const HIDDEN_STEPS: u32 = 40;
const DEFAULT_STEPS: u32 = 35;

/// Режим читаемости
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readability {
    Hidden,
    #[default]
    Balanced,
    Scannable,
}

impl FromStr for Readability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hidden" => Ok(Self::Hidden),
            "balanced" => Ok(Self::Balanced),
            "scannable" => Ok(Self::Scannable),
            other => Err(format!("unknown readability mode: {other}")),
        }
    }
}

impl Readability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readability::Hidden => "hidden",
            Readability::Balanced => "balanced",
            Readability::Scannable => "scannable",
        }
    }
}

/// Режим производительности бэкенда
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Модель целиком на GPU
    #[default]
    Balanced,
    /// Выгрузка в CPU: медленнее, но меньше нагрев и память
    Eco,
}

impl FromStr for PerformanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "eco" => Ok(Self::Eco),
            other => Err(format!("unknown performance mode: {other}")),
        }
    }
}

impl PerformanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceMode::Balanced => "balanced",
            PerformanceMode::Eco => "eco",
        }
    }
}

/// Запрос AI-генерации
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    /// Содержимое QR
    pub data: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub readability: Readability,
    /// `None` - подобрать автоматически
    pub cn_scale: Option<f32>,
    pub guidance_scale: f32,
    pub control_end: f32,
    /// -1 - случайный
    pub seed: i64,
    pub performance: PerformanceMode,
}

impl Default for AiRequest {
    fn default() -> Self {
        Self {
            data: String::new(),
            prompt: String::new(),
            negative_prompt: String::new(),
            readability: Readability::default(),
            cn_scale: None,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            control_end: 1.0,
            seed: -1,
            performance: PerformanceMode::default(),
        }
    }
}

impl AiRequest {
    /// Значение scale из формы: дефолт означает "автоматически"
    pub fn cn_scale_from_form(value: f32) -> Option<f32> {
        if (value - DEFAULT_CN_SCALE).abs() < 1e-6 {
            None
        } else {
            Some(value)
        }
    }

    pub fn validate(&self) -> Result<(), ArtError> {
        if self.data.trim().is_empty() {
            return Err(ArtError::EmptyData);
        }
        if self.prompt.trim().is_empty() {
            return Err(ArtError::MissingPrompt);
        }
        Ok(())
    }
}

/// Усиление контраста/резкости после генерации
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostBoost {
    pub contrast: f32,
    pub sharpness: f32,
}

/// Итоговые параметры генерации
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub prompt: String,
    pub negative_prompt: String,
    pub cn_scale: f32,
    pub guidance_scale: f32,
    pub control_start: f32,
    pub control_end: f32,
    pub steps: u32,
    /// Непрозрачность пост-бленда структуры QR (0 - без бленда)
    pub blend_opacity: f32,
    pub boost: Option<PostBoost>,
    /// Результат анализа промпта (только Hidden)
    pub smart: Option<SmartSettings>,
}

impl GenerationPlan {
    pub fn build(request: &AiRequest) -> Self {
        let mut prompt = PromptBuilder::new(&request.prompt);
        let mut negative = PromptBuilder::new(&request.negative_prompt);
        negative.extend(prompt::ANTI_CARTOON);

        let control_end = if request.control_end.is_finite() {
            request.control_end.clamp(0.0, 1.0)
        } else {
            1.0
        };

        let (cn_scale, steps, blend_opacity, boost, smart) = match request.readability {
            Readability::Hidden => {
                // Analyze the raw user prompt, before quality suffixes are added
                let smart = analyze_prompt(&request.prompt);
                let cn_scale = request.cn_scale.unwrap_or(smart.cn_scale);

                if smart.subject == SubjectKind::Textured {
                    prompt.push(prompt::NATURE_BOOST);
                }
                prompt.push(prompt::LIGHTING_BOOST);
                negative.extend(prompt::ANTI_OBVIOUS);

                let boost = PostBoost {
                    contrast: smart.contrast,
                    sharpness: smart.sharpness,
                };
                (cn_scale, HIDDEN_STEPS, smart.blend, Some(boost), Some(smart))
            }
            Readability::Scannable => {
                let cn_scale = request.cn_scale.unwrap_or(DEFAULT_CN_SCALE);
                (cn_scale, DEFAULT_STEPS, 0.60, None, None)
            }
            Readability::Balanced => {
                let cn_scale = request.cn_scale.unwrap_or(DEFAULT_CN_SCALE);
                (cn_scale, DEFAULT_STEPS, 0.20, None, None)
            }
        };

        prompt.extend_missing(prompt::QUALITY_SUFFIXES);

        Self {
            prompt: prompt.build(),
            negative_prompt: negative.build(),
            cn_scale,
            guidance_scale: request.guidance_scale,
            control_start: 0.0,
            control_end,
            steps,
            blend_opacity,
            boost,
            smart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, readability: Readability) -> AiRequest {
        AiRequest {
            data: "https://example.com".into(),
            prompt: prompt.into(),
            readability,
            ..AiRequest::default()
        }
    }

    #[test]
    fn test_balanced_plan() {
        let plan = GenerationPlan::build(&request("a bowl of ramen", Readability::Balanced));
        assert_eq!(plan.steps, 35);
        assert_eq!(plan.blend_opacity, 0.20);
        assert_eq!(plan.cn_scale, DEFAULT_CN_SCALE);
        assert!(plan.boost.is_none());
        assert!(plan.prompt.starts_with("a bowl of ramen, raw photo"));
        assert!(plan.negative_prompt.starts_with("(deformed"));
    }

    #[test]
    fn test_scannable_plan() {
        let plan = GenerationPlan::build(&request("a bowl of ramen", Readability::Scannable));
        assert_eq!(plan.blend_opacity, 0.60);
        assert_eq!(plan.steps, 35);
    }

    #[test]
    fn test_hidden_textured_plan() {
        let plan = GenerationPlan::build(&request("ancient temple ruins", Readability::Hidden));
        assert_eq!(plan.steps, 40);
        assert_eq!(plan.cn_scale, 1.65);
        assert_eq!(plan.blend_opacity, 0.0);
        assert!(plan.prompt.contains("lush green foliage"));
        assert!(plan.prompt.contains("chiaroscuro"));
        assert!(plan.negative_prompt.ends_with("low contrast"));
        assert_eq!(plan.boost, Some(PostBoost { contrast: 1.20, sharpness: 1.50 }));
    }

    #[test]
    fn test_hidden_analysis_ignores_quality_suffixes() {
        // "soft lighting" is a smooth keyword but only arrives with the suffixes
        let plan = GenerationPlan::build(&request("a bowl of ramen", Readability::Hidden));
        assert_eq!(plan.smart.map(|s| s.subject), Some(SubjectKind::Balanced));
        assert!(plan.prompt.contains("soft lighting"));
    }

    #[test]
    fn test_user_scale_overrides_smart() {
        let mut req = request("portrait", Readability::Hidden);
        req.cn_scale = AiRequest::cn_scale_from_form(1.9);
        assert_eq!(GenerationPlan::build(&req).cn_scale, 1.9);

        req.cn_scale = AiRequest::cn_scale_from_form(DEFAULT_CN_SCALE);
        assert_eq!(GenerationPlan::build(&req).cn_scale, 1.70);
    }

    #[test]
    fn test_control_end_clamped() {
        let mut req = request("x", Readability::Balanced);
        req.control_end = 3.0;
        assert_eq!(GenerationPlan::build(&req).control_end, 1.0);
    }

    #[test]
    fn test_user_negative_first() {
        let mut req = request("x", Readability::Balanced);
        req.negative_prompt = "text, watermark".into();
        let plan = GenerationPlan::build(&req);
        assert!(plan.negative_prompt.starts_with("text, watermark, (deformed"));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(request("", Readability::Hidden).validate(), Err(ArtError::MissingPrompt)));
        let mut req = request("x", Readability::Hidden);
        req.data = " ".into();
        assert!(matches!(req.validate(), Err(ArtError::EmptyData)));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Hidden".parse::<Readability>().unwrap(), Readability::Hidden);
        assert!("loud".parse::<Readability>().is_err());
        assert_eq!("eco".parse::<PerformanceMode>().unwrap(), PerformanceMode::Eco);
    }
}

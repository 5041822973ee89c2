//! Smart Adaptive Engine - анализ промпта
//!
//! По ключевым словам промпта выбирается стратегия генерации:
//! - гладкие объекты (лица, машины, небо) ломаются под сильным ControlNet,
//!   поэтому им нужен лёгкий пост-бленд структуры QR;
//! - текстурные сцены (лес, руины, узоры) прячут код без бленда.
//!
//! Совпадение - по подстроке без учёта регистра.

use serde::{Deserialize, Serialize};

/// Гладкие объекты. Побеждают при конфликте с текстурными словами,
/// например "anime girl in jungle" остаётся Smooth.
const SMOOTH_KEYWORDS: &[&str] = &[
    // Vehicles
    "truck", "car", "bus", "train", "plane", "ship", "boat", "yacht", "bike",
    "motorcycle", "scooter", "spaceship", "robot", "mech", "cyborg", "machine",
    // People & characters
    "face", "portrait", "girl", "boy", "man", "woman", "person", "character",
    "anime", "manga", "waifu", "cartoon", "goddess", "warrior", "elf", "princess",
    "king", "queen", "knight", "human", "body", "skin", "hair",
    // Styles & materials
    "vector", "illustration", "flat", "minimalist", "clean", "simple", "3d render",
    "smooth", "shiny", "glass", "metal", "plastic", "chrome", "polished", "neon",
    "gradient", "studio lighting", "soft", "bokeh", "macro", "unreal engine", "blender",
    // Elements
    "sky", "cloud", "water", "sea", "ocean", "beach", "ice", "snow field",
    "white background", "space", "galaxy", "stars", "moon", "sun", "sunset", "sunrise",
];

/// Текстурные сцены
const TEXTURE_KEYWORDS: &[&str] = &[
    // Nature
    "jungle", "forest", "tree", "plant", "flower", "leaf", "grass", "garden", "park",
    "mountain", "rock", "cliff", "canyon", "cave", "desert", "sand", "waterfall",
    "volcano", "lava", "fire", "smoke",
    // Architecture
    "ruins", "ancient", "temple", "castle", "brick", "stone", "wall", "city",
    "skyscraper", "building", "house", "village", "street", "bridge", "aerial", "map",
    "library", "books", "factory", "industrial",
    // Patterns & art
    "texture", "pattern", "mosaic", "stained glass", "circuit", "cyberpunk",
    "steampunk", "intricate", "detailed", "painting", "oil", "sketch", "drawing",
    "graffiti", "grunge", "rust", "old", "dirty",
];

/// Класс сюжета
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// Structure + micro-blend
    Smooth,
    /// Pure structure ("shadow art")
    Textured,
    /// Промпт без явных признаков
    Balanced,
}

impl SubjectKind {
    pub fn label(&self) -> &'static str {
        match self {
            SubjectKind::Smooth => "Smooth/Adaptive",
            SubjectKind::Textured => "Textured/Nature",
            SubjectKind::Balanced => "Balanced/General",
        }
    }
}

/// Параметры, подобранные по промпту
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmartSettings {
    pub subject: SubjectKind,
    /// controlnet_conditioning_scale
    pub cn_scale: f32,
    /// Непрозрачность пост-бленда структуры QR
    pub blend: f32,
    pub contrast: f32,
    pub sharpness: f32,
}

impl SmartSettings {
    pub fn for_subject(subject: SubjectKind) -> Self {
        match subject {
            SubjectKind::Smooth => Self {
                subject,
                cn_scale: 1.70,
                blend: 0.15,
                contrast: 1.05,
                sharpness: 1.15,
            },
            // Lower scale than the others lets foliage grow over the grid
            SubjectKind::Textured => Self {
                subject,
                cn_scale: 1.65,
                blend: 0.0,
                contrast: 1.20,
                sharpness: 1.50,
            },
            SubjectKind::Balanced => Self {
                subject,
                cn_scale: 1.75,
                blend: 0.10,
                contrast: 1.10,
                sharpness: 1.25,
            },
        }
    }
}

/// Классификация промпта
pub fn classify(prompt: &str) -> SubjectKind {
    let p = prompt.to_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| p.contains(k));

    if has_any(SMOOTH_KEYWORDS) {
        SubjectKind::Smooth
    } else if has_any(TEXTURE_KEYWORDS) {
        SubjectKind::Textured
    } else {
        SubjectKind::Balanced
    }
}

/// Анализ промпта и выбор параметров
pub fn analyze_prompt(prompt: &str) -> SmartSettings {
    let settings = SmartSettings::for_subject(classify(prompt));
    log::info!(
        "Smart analysis: {} (CN: {:.2}, blend: {:.2})",
        settings.subject.label(),
        settings.cn_scale,
        settings.blend
    );
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_subjects() {
        assert_eq!(classify("A red sports CAR on a highway"), SubjectKind::Smooth);
        assert_eq!(classify("portrait of an old knight"), SubjectKind::Smooth);
    }

    #[test]
    fn test_smooth_wins_over_texture() {
        assert_eq!(classify("anime girl in a jungle"), SubjectKind::Smooth);
    }

    #[test]
    fn test_textured_subjects() {
        assert_eq!(classify("lush tropical jungle, ferns"), SubjectKind::Textured);
        assert_eq!(classify("ancient temple ruins"), SubjectKind::Textured);
    }

    #[test]
    fn test_balanced_fallback() {
        assert_eq!(classify("a bowl of ramen"), SubjectKind::Balanced);
        assert_eq!(classify(""), SubjectKind::Balanced);
    }

    #[test]
    fn test_substring_matching() {
        // "scarf" contains "car"
        assert_eq!(classify("knitted scarf"), SubjectKind::Smooth);
    }

    #[test]
    fn test_preset_values() {
        let s = analyze_prompt("medieval castle");
        assert_eq!(s.subject, SubjectKind::Textured);
        assert_eq!(s.cn_scale, 1.65);
        assert_eq!(s.blend, 0.0);
        assert_eq!(s.sharpness, 1.50);
    }
}

//! Дополнение промптов
//!
//! Модель склонна к мультяшному стилю, поэтому к промпту добавляются
//! "реалистичные" суффиксы, а к негативному - анти-мультяшные термины.

/// Суффиксы реализма, добавляются если их ещё нет в промпте
pub const QUALITY_SUFFIXES: &[&str] = &[
    "raw photo",
    "photorealistic",
    "8k uhd",
    "dslr",
    "soft lighting",
    "high quality",
    "film grain",
    "Fujifilm XT3",
    "intricate details",
];

pub const ANTI_CARTOON: &[&str] = &[
    "(deformed, distorted, disfigured:1.3)",
    "poorly drawn",
    "bad anatomy",
    "wrong anatomy",
    "extra limb",
    "missing limb",
    "floating limbs",
    "(mutated hands and fingers:1.4)",
    "disconnected limbs",
    "mutation",
    "mutated",
    "ugly",
    "disgusting",
    "blurry",
    "amputation",
    "(cartoon, anime, 3d, painting, drawing, illustration, sketch, flat, vector art:1.2)",
    "bad quality",
    "low quality",
    "jpeg artifacts",
];

/// Освещение, которое делает тёмные/светлые модули различимыми
pub const LIGHTING_BOOST: &str = "high contrast, deep shadows, volumetric lighting, sunlit, \
distinct light and dark areas, chiaroscuro";

pub const NATURE_BOOST: &str = "lush green foliage, dense ferns, mossy texture, biology, \
detailed leaves, sun rays in forest, organic pattern";

/// Всё, что выдаёт сетку QR
pub const ANTI_OBVIOUS: &[&str] = &[
    "obvious grid",
    "regular squares",
    "artificial pattern",
    "computer generated grid",
    "barcode appearance",
    "border",
    "frame",
    "flat lighting",
    "low contrast",
];

/// Построитель промпта через запятую без пустых элементов
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
}

impl PromptBuilder {
    pub fn new(base: &str) -> Self {
        let mut builder = Self::default();
        builder.push(base);
        builder
    }

    /// Добавить фрагмент (пустые и пробельные игнорируются)
    pub fn push(&mut self, part: &str) -> &mut Self {
        let part = part.trim().trim_matches(',').trim();
        if !part.is_empty() {
            self.parts.push(part.to_string());
        }
        self
    }

    pub fn extend(&mut self, parts: &[&str]) -> &mut Self {
        for part in parts {
            self.push(part);
        }
        self
    }

    /// Добавить только те фрагменты, которых ещё нет (без учёта регистра)
    pub fn extend_missing(&mut self, parts: &[&str]) -> &mut Self {
        let current = self.build().to_lowercase();
        for part in parts {
            if !current.contains(&part.to_lowercase()) {
                self.push(part);
            }
        }
        self
    }

    pub fn build(&self) -> String {
        self.parts.join(", ")
    }
}

//! Integration tests for QR art generation

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use qr_art_core::{
    AiRequest, ArtEngine, ArtError, BackendError, BlendMode, ClassicOptions, DiffusionBackend,
    DiffusionRequest, EngineConfig, NoProgress, ProgressObserver, Readability, ScanVerifier, Style,
};

/// Backend that returns a flat image and records the last request
struct FlatBackend {
    color: Rgb<u8>,
    last: Mutex<Option<DiffusionRequest>>,
}

impl FlatBackend {
    fn new(color: [u8; 3]) -> Arc<Self> {
        Arc::new(Self {
            color: Rgb(color),
            last: Mutex::new(None),
        })
    }
}

#[async_trait]
impl DiffusionBackend for FlatBackend {
    fn name(&self) -> &str {
        "flat"
    }

    async fn generate(
        &self,
        request: &DiffusionRequest,
        progress: &dyn ProgressObserver,
    ) -> Result<RgbImage, BackendError> {
        *self.last.lock().unwrap() = Some(request.clone());
        for step in 1..=request.steps {
            if progress.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            progress.on_step(step, request.steps);
        }
        Ok(RgbImage::from_pixel(512, 512, self.color))
    }
}

#[derive(Default)]
struct Recorder {
    last_step: AtomicU32,
    cancelled: AtomicBool,
}

impl ProgressObserver for Recorder {
    fn on_step(&self, step: u32, _total: u32) {
        self.last_step.store(step, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gradient_background() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(640, 480, |x, y| {
        Rgb([(90 + x * 100 / 640) as u8, (110 + y * 100 / 480) as u8, 130])
    }))
}

fn request(readability: Readability) -> AiRequest {
    AiRequest {
        data: "https://example.com/qr".into(),
        prompt: "a medieval village with cobblestone streets".into(),
        readability,
        seed: 42,
        ..AiRequest::default()
    }
}

#[test]
fn test_classic_placeholder_scans() {
    init_logging();
    let data = "https://example.com/classic";
    let img = qr_art_core::render_art_qr(data, None, &ClassicOptions::default()).unwrap();

    let decoded = ScanVerifier::new().verify(&img, data).unwrap();
    assert_eq!(decoded.content, data);
}

#[test]
fn test_classic_with_background_scans() {
    init_logging();
    let data = "HELLO WORLD";
    let bg = gradient_background();
    let options = ClassicOptions {
        style: Style {
            rounded_radius: 0,
            ..Style::default()
        },
        ..ClassicOptions::default()
    };

    let img = qr_art_core::render_art_qr(data, Some(&bg), &options).unwrap();
    assert!(matches!(img, DynamicImage::ImageRgb8(_)));
    assert!(ScanVerifier::new().verify(&img, data).is_ok());
}

#[test]
fn test_classic_organic_keeps_square_size() {
    init_logging();
    let options = ClassicOptions {
        out_size: 600,
        style: Style {
            mode: BlendMode::Organic,
            ..Style::default()
        },
        ..ClassicOptions::default()
    };
    let img = qr_art_core::render_art_qr("organic", Some(&gradient_background()), &options).unwrap();
    assert_eq!(img.width(), img.height());
    assert!(img.width() <= 600);
}

#[test]
fn test_engine_classic_reports_scannable() {
    init_logging();
    let engine = ArtEngine::new(FlatBackend::new([128, 128, 128]), EngineConfig::default());
    let output = engine
        .render_classic("engine test", None, &ClassicOptions::default())
        .unwrap();

    assert_eq!(output.scannable, Some(true));
    assert!(output.plan.is_none());
    assert_eq!(&output.png[1..4], b"PNG");
    assert!(!output.base64().is_empty());
}

#[tokio::test]
async fn test_engine_ai_hidden_plan_reaches_backend() {
    init_logging();
    let backend = FlatBackend::new([120, 110, 100]);
    let engine = ArtEngine::new(backend.clone(), EngineConfig::default());
    let recorder = Recorder::default();

    let output = engine
        .generate_ai(&request(Readability::Hidden), &recorder)
        .await
        .unwrap();

    let sent = backend.last.lock().unwrap().clone().unwrap();
    // "cobblestone" is a texture keyword
    assert!((sent.cn_scale - 1.65).abs() < 1e-6);
    assert_eq!(sent.steps, 40);
    assert_eq!(sent.seed, 42);
    assert!(sent.prompt.starts_with("a medieval village"));
    assert!(sent.negative_prompt.contains("cartoon"));
    // border 0, 10px per module
    assert_eq!(sent.control_image.width() % 10, 0);

    assert_eq!(recorder.last_step.load(Ordering::SeqCst), 40);
    assert_eq!(output.width, 512);
    assert!(output.scannable.is_some());
    let plan = output.plan.unwrap();
    assert!((plan.blend_opacity - 0.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_engine_ai_explicit_scale_wins() {
    init_logging();
    let backend = FlatBackend::new([90, 90, 90]);
    let engine = ArtEngine::new(backend.clone(), EngineConfig::default());
    let mut req = request(Readability::Scannable);
    req.cn_scale = Some(1.9);

    let output = engine.generate_ai(&req, &NoProgress).await.unwrap();

    let sent = backend.last.lock().unwrap().clone().unwrap();
    assert!((sent.cn_scale - 1.9).abs() < 1e-6);
    assert_eq!(sent.steps, 35);
    assert!((output.plan.unwrap().blend_opacity - 0.60).abs() < 1e-6);
}

#[tokio::test]
async fn test_engine_ai_cancelled() {
    init_logging();
    let engine = ArtEngine::new(FlatBackend::new([0, 0, 0]), EngineConfig::default());
    let recorder = Recorder::default();
    recorder.cancelled.store(true, Ordering::SeqCst);

    let result = engine.generate_ai(&request(Readability::Balanced), &recorder).await;
    assert!(matches!(result, Err(ArtError::Backend(BackendError::Cancelled))));
}

#[tokio::test]
async fn test_engine_ai_requires_prompt() {
    init_logging();
    let backend = FlatBackend::new([0, 0, 0]);
    let engine = ArtEngine::new(backend.clone(), EngineConfig::default());
    let mut req = request(Readability::Balanced);
    req.prompt = "   ".into();

    let result = engine.generate_ai(&req, &NoProgress).await;
    assert!(matches!(result, Err(ArtError::MissingPrompt)));
    assert!(backend.last.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_engine_without_verification() {
    init_logging();
    let config = EngineConfig {
        verify_output: false,
        ..EngineConfig::default()
    };
    let engine = ArtEngine::new(FlatBackend::new([200, 200, 200]), config);
    let output = engine
        .generate_ai(&request(Readability::Balanced), &NoProgress)
        .await
        .unwrap();
    assert_eq!(output.scannable, None);
}

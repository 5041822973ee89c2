//! WebUI backend against a mocked AUTOMATIC1111 API

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use httpmock::prelude::*;
use image::{ImageFormat, Rgb, RgbImage};
use qr_art_core::{
    BackendError, DiffusionBackend, DiffusionRequest, PerformanceMode, ProgressObserver, QrMatrix,
    WebUiBackend, WebUiConfig,
};
use serde_json::json;

#[derive(Default)]
struct Observer {
    steps: AtomicU32,
    cancel: AtomicBool,
}

impl ProgressObserver for Observer {
    fn on_step(&self, step: u32, _total: u32) {
        self.steps.store(step, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn png_b64(width: u32, height: u32) -> String {
    let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    STANDARD.encode(buf.into_inner())
}

fn request(steps: u32) -> DiffusionRequest {
    DiffusionRequest {
        control_image: QrMatrix::encode("https://example.com", 0)
            .unwrap()
            .control_image(10),
        prompt: "ancient ruins".into(),
        negative_prompt: "blurry".into(),
        cn_scale: 1.65,
        guidance_scale: 7.5,
        control_start: 0.0,
        control_end: 0.9,
        steps,
        seed: 7,
        performance: PerformanceMode::Balanced,
    }
}

fn backend(server: &MockServer) -> WebUiBackend {
    WebUiBackend::new(WebUiConfig {
        base_url: server.base_url(),
        poll_interval_ms: 20,
        timeout_secs: 10,
        ..WebUiConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_txt2img_success() {
    init_logging();
    let server = MockServer::start_async().await;
    let generate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/sdapi/v1/txt2img")
                .json_body_partial(r#"{"steps": 30, "seed": 7, "sampler_name": "DPM++ 2M Karras"}"#);
            then.status(200)
                .json_body(json!({ "images": [png_b64(512, 512), png_b64(512, 512)] }));
        })
        .await;

    let observer = Observer::default();
    let img = backend(&server).generate(&request(30), &observer).await.unwrap();

    generate.assert_async().await;
    assert_eq!(img.dimensions(), (512, 512));
    assert_eq!(img.get_pixel(0, 0), &Rgb([10, 200, 30]));
    assert_eq!(observer.steps.load(Ordering::SeqCst), 30);
}

#[tokio::test]
async fn test_progress_is_polled() {
    init_logging();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/txt2img");
            then.status(200)
                .delay(Duration::from_millis(300))
                .json_body(json!({ "images": [png_b64(64, 64)] }));
        })
        .await;
    let progress = server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/progress");
            then.status(200)
                .json_body(json!({ "progress": 0.5, "state": { "sampling_step": 12, "sampling_steps": 25 } }));
        })
        .await;

    let observer = Observer::default();
    backend(&server).generate(&request(25), &observer).await.unwrap();

    assert!(progress.hits_async().await > 0);
    // Final step is reported once the image arrives
    assert_eq!(observer.steps.load(Ordering::SeqCst), 25);
}

#[tokio::test]
async fn test_cancel_interrupts_webui() {
    init_logging();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/txt2img");
            then.status(200)
                .delay(Duration::from_secs(5))
                .json_body(json!({ "images": [png_b64(64, 64)] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/progress");
            then.status(200).json_body(json!({ "state": {} }));
        })
        .await;
    let interrupt = server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/interrupt");
            then.status(200);
        })
        .await;

    let observer = Observer::default();
    observer.cancel.store(true, Ordering::SeqCst);

    let result = backend(&server).generate(&request(30), &observer).await;

    assert!(matches!(result, Err(BackendError::Cancelled)));
    interrupt.assert_async().await;
}

#[tokio::test]
async fn test_empty_images() {
    init_logging();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/txt2img");
            then.status(200).json_body(json!({ "images": [] }));
        })
        .await;

    let result = backend(&server).generate(&request(20), &Observer::default()).await;
    assert!(matches!(result, Err(BackendError::EmptyResult)));
}

#[tokio::test]
async fn test_error_status() {
    init_logging();
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/txt2img");
            then.status(500).body("CUDA out of memory");
        })
        .await;

    let result = backend(&server).generate(&request(20), &Observer::default()).await;
    match result {
        Err(BackendError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("out of memory"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

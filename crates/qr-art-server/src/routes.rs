//! Обработчики HTTP

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use qr_art_core::{AiRequest, ArtError, ArtOutput, BackendError, GenerationPlan, NoProgress};
use serde_json::json;

use crate::error::ServerError;
use crate::form::{FormData, FormValues, Mode};
use crate::page::render_page;
use crate::state::{ResultCache, TaskProgress, TaskSnapshot};
use crate::AppState;

/// Шагов до того, как бэкенд сообщит реальное число
const INITIAL_TOTAL_STEPS: u32 = 30;

pub async fn index() -> Html<String> {
    Html(render_page(&FormValues::initial(), None, None))
}

pub async fn health() -> &'static str {
    "ok"
}

/// Синхронная генерация с HTML ответом
pub async fn generate(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match FormData::from_multipart(multipart).await {
        Ok(form) => form,
        Err(e) => return page_error(&FormValues::initial(), &e, e.status()),
    };
    let values = match FormValues::from_form(&form) {
        Ok(values) => values,
        Err(e) => return page_error(&FormValues::initial(), &e, e.status()),
    };

    let cache_key = (form.upload.is_none() && values.is_deterministic())
        .then(|| ResultCache::key(&form.fields));
    if let Some(hit) = cache_key.as_deref().and_then(|key| state.cache.get(key)) {
        log::info!("Result cache hit");
        return Html(render_page(&values, Some(&hit), None)).into_response();
    }

    match render(&state, &values, form.upload).await {
        Ok(output) => {
            let b64 = output.base64();
            if let Some(key) = cache_key {
                state.cache.insert(key, b64.clone());
            }
            Html(render_page(&values, Some(&b64), None)).into_response()
        }
        Err(e) => page_error(&values, &e, e.status()),
    }
}

fn page_error(values: &FormValues, error: &ServerError, status: StatusCode) -> Response {
    if status.is_server_error() {
        log::error!("Generation failed: {}", error);
    } else {
        log::info!("Rejected request: {}", error);
    }
    let message = match error {
        ServerError::DataRequired => "Data must not be empty".to_string(),
        other => other.to_string(),
    };
    (status, Html(render_page(values, None, Some(&message)))).into_response()
}

async fn render(
    state: &AppState,
    values: &FormValues,
    upload: Option<Vec<u8>>,
) -> Result<ArtOutput, ServerError> {
    if values.data.is_empty() {
        return Err(ServerError::DataRequired);
    }

    match values.mode {
        Mode::Ai => {
            let request = values.ai_request();
            if request.prompt.is_empty() {
                return Err(ServerError::PromptRequired);
            }
            let _permit = state
                .jobs
                .acquire()
                .await
                .map_err(|e| ServerError::Worker(e.to_string()))?;
            Ok(state.engine.generate_ai(&request, &NoProgress).await?)
        }
        Mode::Classic(_) => {
            let options = values.classic_options()?;
            let background = upload
                .map(|bytes| image::load_from_memory(&bytes))
                .transpose()?;
            let engine = Arc::clone(&state.engine);
            let data = values.data.clone();
            let output = tokio::task::spawn_blocking(move || {
                engine.render_classic(&data, background.as_ref(), &options)
            })
            .await
            .map_err(|e| ServerError::Worker(e.to_string()))??;
            Ok(output)
        }
    }
}

/// Запуск фоновой AI задачи
pub async fn generate_ai(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ServerError> {
    let form = FormData::from_multipart(multipart).await?;
    let values = FormValues::from_form(&form)?;
    if values.data.is_empty() {
        return Err(ServerError::DataRequired);
    }
    let request = values.ai_request();
    if request.prompt.is_empty() {
        return Err(ServerError::PromptRequired);
    }

    let task_id = state.tasks.create(INITIAL_TOTAL_STEPS);
    log::info!("Task {} queued ({})", task_id, request.readability.as_str());

    tokio::spawn(run_ai_task(state, task_id.clone(), request));
    Ok(Json(json!({ "task_id": task_id })))
}

async fn run_ai_task(state: AppState, task_id: String, request: AiRequest) {
    let tasks = state.tasks.clone();

    let _permit = match state.jobs.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            tasks.fail(&task_id, e.to_string());
            return;
        }
    };
    if !tasks.start(&task_id) {
        log::info!("Task {} cancelled before start", task_id);
        return;
    }

    let steps = GenerationPlan::build(&request).steps;
    tasks.set_step(&task_id, 0, steps);

    let observer = TaskProgress::new(tasks.clone(), task_id.clone());
    match state.engine.generate_ai(&request, &observer).await {
        Ok(output) => {
            log::info!("Task {} completed (scannable: {:?})", task_id, output.scannable);
            tasks.complete(&task_id, output.base64(), output.scannable);
        }
        Err(ArtError::Backend(BackendError::Cancelled)) => {
            log::info!("Task {} cancelled", task_id);
            tasks.cancel(&task_id);
        }
        Err(e) => {
            log::error!("Task {} failed: {}", task_id, e);
            tasks.fail(&task_id, e.to_string());
        }
    }
}

pub async fn progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, ServerError> {
    state
        .tasks
        .get(&task_id)
        .map(Json)
        .ok_or(ServerError::TaskNotFound)
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let status = state.tasks.cancel(&task_id).ok_or(ServerError::TaskNotFound)?;
    log::info!("Cancel requested for task {}", task_id);
    Ok(Json(json!({ "status": status })))
}

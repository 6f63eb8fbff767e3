use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Html;
use axum::Json;
use faceswap_core::types::{FIELD_BLEND_STRENGTH, FIELD_FACE_ALIGNMENT};
use faceswap_core::{ImageRole, SwapJob, SwapParams, SwapResponse};
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// One uploaded file part, held in memory until both are validated.
struct UploadPart {
    file_name: String,
    bytes: Vec<u8>,
}

/// Everything the endpoint reads from the multipart body.
#[derive(Default)]
struct SwapForm {
    source: Option<UploadPart>,
    target: Option<UploadPart>,
    blend_strength: Option<String>,
    face_alignment: Option<String>,
}

impl SwapForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if let Some(role) = ImageRole::from_field_name(&name) {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                let part = Some(UploadPart { file_name, bytes });
                match role {
                    ImageRole::Source => form.source = part,
                    ImageRole::Target => form.target = part,
                }
            } else if name == FIELD_BLEND_STRENGTH {
                form.blend_strength = Some(field.text().await?);
            } else if name == FIELD_FACE_ALIGNMENT {
                form.face_alignment = Some(field.text().await?);
            } else {
                tracing::debug!(field = %name, "ignoring unknown form field");
            }
        }
        Ok(form)
    }
}

/// `POST /api/face-swap`
///
/// Stages both uploads, runs the processing command once, and answers with
/// the public path of the output. Nothing touches the disk unless both
/// images are present.
pub async fn face_swap(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SwapResponse>, ApiError> {
    let mut multipart = multipart?;
    let form = SwapForm::read(&mut multipart).await?;

    let (Some(source), Some(target)) = (form.source, form.target) else {
        return Err(ApiError::MissingImages);
    };

    let params = SwapParams::from_form(
        form.blend_strength.as_deref(),
        form.face_alignment.as_deref(),
    );

    let source_file = state
        .storage
        .persist(ImageRole::Source, &source.file_name, &source.bytes)
        .await?;
    let target_file = state
        .storage
        .persist(ImageRole::Target, &target.file_name, &target.bytes)
        .await?;
    let output_file = state.storage.allocate_output(&state.output_extension);

    let job = SwapJob {
        source: source_file.path,
        target: target_file.path,
        output: output_file.path.clone(),
        params,
    };
    let output = state.command.run(&job).await?;

    if state.verify_output && !tokio::fs::try_exists(&output_file.path).await.unwrap_or(false) {
        return Err(ApiError::OutputMissing(
            output_file.path.display().to_string(),
        ));
    }

    let result_image = state.storage.public_path(&output_file.name);
    tracing::info!(result = %result_image, "face swap completed");

    Ok(Json(SwapResponse {
        success: true,
        result_image,
        message: output.stdout,
    }))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.storage.root().display().to_string(),
        "command": state.command.program,
    }))
}

/// `GET /`: the browser upload page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

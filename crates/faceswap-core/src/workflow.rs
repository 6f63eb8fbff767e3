//! Client-side upload workflow.
//!
//! A single state value drives what a client may do next:
//! selecting images, waiting on the endpoint, or showing a result.
//! Button enablement is derived from that state, never stored beside it.

use crate::types::{
    clamp_param, ImageRole, SwapParams, SwapResponse, DOWNLOAD_FILE_NAME,
};
use image::ImageFormat;
use std::io::Cursor;
use thiserror::Error;

/// Shown when the endpoint's error body carries no usable message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to process images";

const CACHE_BUSTER_KEY: &str = "t";

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Please select both source and target images")]
    MissingImages,
    #[error("a request is already being processed")]
    AlreadyProcessing,
    #[error("{0} is not a recognized image")]
    NotAnImage(String),
}

/// An image picked by the user, held in memory until submission.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// `(width, height)` when the header could be decoded.
    pub dimensions: Option<(u32, u32)>,
}

impl SelectedImage {
    /// Accept `bytes` only if they look like an image.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, WorkflowError> {
        let file_name = file_name.into();
        let format = image::guess_format(&bytes)
            .map_err(|_| WorkflowError::NotAnImage(file_name.clone()))?;
        let dimensions = image::ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .ok();
        Ok(Self {
            file_name,
            bytes,
            format,
            dimensions,
        })
    }

    /// MIME type for the multipart part.
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// The artifact shown after a successful swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapResult {
    /// Path exactly as returned by the endpoint.
    pub result_image: String,
    /// `result_image` with a cache-busting query appended.
    pub display_url: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum WorkflowState {
    /// Zero, one or two images chosen; nothing in flight.
    Selecting {
        source: Option<SelectedImage>,
        target: Option<SelectedImage>,
    },
    /// One request in flight.
    Processing {
        source: SelectedImage,
        target: SelectedImage,
    },
    ShowingResult {
        source: SelectedImage,
        target: SelectedImage,
        result: SwapResult,
    },
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::Selecting {
            source: None,
            target: None,
        }
    }
}

/// Payload of the single request issued per submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub source: SelectedImage,
    pub target: SelectedImage,
    pub params: SwapParams,
}

impl SubmitRequest {
    /// Text fields as decimal strings, in form order.
    pub fn text_fields(&self) -> [(&'static str, String); 2] {
        [
            (
                crate::types::FIELD_BLEND_STRENGTH,
                self.params.blend_strength.to_string(),
            ),
            (
                crate::types::FIELD_FACE_ALIGNMENT,
                self.params.face_alignment.to_string(),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workflow {
    state: WorkflowState,
    params: SwapParams,
    last_error: Option<String>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn params(&self) -> SwapParams {
        self.params
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn select_source(&mut self, image: SelectedImage) -> Result<(), WorkflowError> {
        self.select(ImageRole::Source, image)
    }

    pub fn select_target(&mut self, image: SelectedImage) -> Result<(), WorkflowError> {
        self.select(ImageRole::Target, image)
    }

    /// Replace one image. Picking a new image discards any shown result.
    pub fn select(&mut self, role: ImageRole, image: SelectedImage) -> Result<(), WorkflowError> {
        let (mut source, mut target) = match std::mem::take(&mut self.state) {
            WorkflowState::Selecting { source, target } => (source, target),
            WorkflowState::ShowingResult { source, target, .. } => (Some(source), Some(target)),
            state @ WorkflowState::Processing { .. } => {
                self.state = state;
                return Err(WorkflowError::AlreadyProcessing);
            }
        };
        match role {
            ImageRole::Source => source = Some(image),
            ImageRole::Target => target = Some(image),
        }
        self.state = WorkflowState::Selecting { source, target };
        Ok(())
    }

    pub fn set_blend_strength(&mut self, value: i64) {
        self.params.blend_strength = clamp_param(value);
    }

    pub fn set_face_alignment(&mut self, value: i64) {
        self.params.face_alignment = clamp_param(value);
    }

    pub fn source(&self) -> Option<&SelectedImage> {
        match &self.state {
            WorkflowState::Selecting { source, .. } => source.as_ref(),
            WorkflowState::Processing { source, .. }
            | WorkflowState::ShowingResult { source, .. } => Some(source),
        }
    }

    pub fn target(&self) -> Option<&SelectedImage> {
        match &self.state {
            WorkflowState::Selecting { target, .. } => target.as_ref(),
            WorkflowState::Processing { target, .. }
            | WorkflowState::ShowingResult { target, .. } => Some(target),
        }
    }

    pub fn result(&self) -> Option<&SwapResult> {
        match &self.state {
            WorkflowState::ShowingResult { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, WorkflowState::Processing { .. })
    }

    pub fn can_submit(&self) -> bool {
        !self.is_processing() && self.source().is_some() && self.target().is_some()
    }

    pub fn can_download(&self) -> bool {
        self.result().is_some()
    }

    /// Enter `Processing` and hand back the request to send.
    ///
    /// Without both images nothing changes and no request must be sent.
    pub fn begin_submit(&mut self) -> Result<SubmitRequest, WorkflowError> {
        let (source, target) = match std::mem::take(&mut self.state) {
            WorkflowState::Selecting {
                source: Some(source),
                target: Some(target),
            }
            | WorkflowState::ShowingResult { source, target, .. } => (source, target),
            state @ WorkflowState::Selecting { .. } => {
                self.state = state;
                return Err(WorkflowError::MissingImages);
            }
            state @ WorkflowState::Processing { .. } => {
                self.state = state;
                return Err(WorkflowError::AlreadyProcessing);
            }
        };

        self.last_error = None;
        let request = SubmitRequest {
            source: source.clone(),
            target: target.clone(),
            params: self.params,
        };
        self.state = WorkflowState::Processing { source, target };
        Ok(request)
    }

    /// Record a successful response. `now_millis` becomes the cache buster.
    pub fn finish_success(&mut self, response: &SwapResponse, now_millis: i64) {
        self.state = match std::mem::take(&mut self.state) {
            WorkflowState::Processing { source, target } => WorkflowState::ShowingResult {
                source,
                target,
                result: SwapResult {
                    result_image: response.result_image.clone(),
                    display_url: with_cache_buster(&response.result_image, now_millis),
                    message: response.message.clone(),
                },
            },
            other => {
                tracing::warn!("finish_success outside of processing; ignored");
                other
            }
        };
    }

    /// Record a failed request. Images stay selected so the user can retry.
    pub fn finish_failure(&mut self, message: impl Into<String>) {
        self.state = match std::mem::take(&mut self.state) {
            WorkflowState::Processing { source, target } => WorkflowState::Selecting {
                source: Some(source),
                target: Some(target),
            },
            other => other,
        };
        self.last_error = Some(message.into());
    }

    /// Back to initial defaults: no images, no result, params 50/50.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn download_file_name(&self) -> &'static str {
        DOWNLOAD_FILE_NAME
    }
}

/// Pull a human-readable message out of an error response body.
pub fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
}

/// Append `?t=<millis>` (or `&t=` if a query exists).
pub fn with_cache_buster(path: &str, millis: i64) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{path}{sep}{CACHE_BUSTER_KEY}={millis}")
}

/// Inverse of [`with_cache_buster`].
pub fn strip_cache_buster(url: &str) -> &str {
    match url.rfind(['?', '&']) {
        Some(idx) if url[idx + 1..].starts_with("t=") => &url[..idx],
        _ => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Smallest valid GIF: 1x1, one colour.
    const GIF_1X1: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff,
        0xff, 0xff, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c,
        0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00,
        0x3b,
    ];

    fn img(name: &str) -> SelectedImage {
        SelectedImage::from_bytes(name, GIF_1X1.to_vec()).unwrap()
    }

    fn response() -> SwapResponse {
        SwapResponse {
            success: true,
            result_image: "/uploads/output-abc.jpg".into(),
            message: "ok".into(),
        }
    }

    #[test]
    fn test_selected_image_detects_format() {
        let image = img("a.gif");
        assert_eq!(image.format, ImageFormat::Gif);
        assert_eq!(image.dimensions, Some((1, 1)));
        assert_eq!(image.mime_type(), "image/gif");
    }

    #[test]
    fn test_selected_image_rejects_text() {
        let err = SelectedImage::from_bytes("notes.txt", b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, WorkflowError::NotAnImage(name) if name == "notes.txt"));
    }

    #[test]
    fn test_one_image_cannot_submit() {
        let mut wf = Workflow::new();
        assert!(!wf.can_submit());
        wf.select_source(img("s.gif")).unwrap();
        assert!(!wf.can_submit());
        assert!(matches!(wf.begin_submit(), Err(WorkflowError::MissingImages)));
        assert!(!wf.is_processing());
        assert!(wf.source().is_some());
    }

    #[test]
    fn test_both_images_enable_submit() {
        let mut wf = Workflow::new();
        wf.select_target(img("t.gif")).unwrap();
        wf.select_source(img("s.gif")).unwrap();
        assert!(wf.can_submit());
    }

    #[test]
    fn test_submit_blocks_repeat() {
        let mut wf = Workflow::new();
        wf.select_source(img("s.gif")).unwrap();
        wf.select_target(img("t.gif")).unwrap();
        wf.set_blend_strength(80);

        let req = wf.begin_submit().unwrap();
        assert_eq!(req.source.file_name, "s.gif");
        assert_eq!(
            req.text_fields(),
            [
                ("blendStrength", "80".to_string()),
                ("faceAlignment", "50".to_string())
            ]
        );
        assert!(wf.is_processing());
        assert!(!wf.can_submit());
        assert!(matches!(wf.begin_submit(), Err(WorkflowError::AlreadyProcessing)));
        assert!(matches!(
            wf.select_source(img("x.gif")),
            Err(WorkflowError::AlreadyProcessing)
        ));
    }

    #[test]
    fn test_success_adds_cache_buster_only() {
        let mut wf = Workflow::new();
        wf.select_source(img("s.gif")).unwrap();
        wf.select_target(img("t.gif")).unwrap();
        wf.begin_submit().unwrap();
        wf.finish_success(&response(), 1_700_000_000_123);

        let result = wf.result().unwrap();
        assert_eq!(result.display_url, "/uploads/output-abc.jpg?t=1700000000123");
        assert_eq!(strip_cache_buster(&result.display_url), result.result_image);
        assert!(wf.can_download());
        assert!(!wf.is_processing());
    }

    #[test]
    fn test_failure_keeps_images() {
        let mut wf = Workflow::new();
        wf.select_source(img("s.gif")).unwrap();
        wf.select_target(img("t.gif")).unwrap();
        wf.begin_submit().unwrap();
        wf.finish_failure("Face swap processing failed");

        assert_eq!(wf.last_error(), Some("Face swap processing failed"));
        assert!(wf.can_submit());
        assert!(!wf.can_download());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut wf = Workflow::new();
        wf.select_source(img("s.gif")).unwrap();
        wf.select_target(img("t.gif")).unwrap();
        wf.set_blend_strength(10);
        wf.set_face_alignment(500);
        assert_eq!(wf.params().face_alignment, 100);
        wf.begin_submit().unwrap();
        wf.finish_success(&response(), 1);

        wf.reset();
        assert!(wf.source().is_none());
        assert!(wf.target().is_none());
        assert!(wf.result().is_none());
        assert_eq!(wf.params(), SwapParams::default());
        assert!(!wf.can_submit());
    }

    #[test]
    fn test_new_selection_clears_result() {
        let mut wf = Workflow::new();
        wf.select_source(img("s.gif")).unwrap();
        wf.select_target(img("t.gif")).unwrap();
        wf.begin_submit().unwrap();
        wf.finish_success(&response(), 1);

        wf.select_target(img("t2.gif")).unwrap();
        assert!(wf.result().is_none());
        assert_eq!(wf.target().unwrap().file_name, "t2.gif");
        assert!(wf.can_submit());
    }

    #[test]
    fn test_error_message_from_body() {
        assert_eq!(
            error_message_from_body(r#"{"error":"Source and target images are required"}"#),
            "Source and target images are required"
        );
        assert_eq!(error_message_from_body("<html>502</html>"), GENERIC_FAILURE_MESSAGE);
        assert_eq!(error_message_from_body(r#"{"error":""}"#), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_cache_buster_with_existing_query() {
        assert_eq!(with_cache_buster("/a.jpg?x=1", 5), "/a.jpg?x=1&t=5");
        assert_eq!(strip_cache_buster("/a.jpg?x=1&t=5"), "/a.jpg?x=1");
        assert_eq!(strip_cache_buster("/a.jpg"), "/a.jpg");
    }
}

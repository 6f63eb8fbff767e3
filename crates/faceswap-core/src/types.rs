use serde::{Deserialize, Serialize};

/// Route of the processing endpoint.
pub const SWAP_ENDPOINT: &str = "/api/face-swap";

/// Multipart field names shared by every client and the endpoint.
pub const FIELD_SOURCE_IMAGE: &str = "sourceImage";
pub const FIELD_TARGET_IMAGE: &str = "targetImage";
pub const FIELD_BLEND_STRENGTH: &str = "blendStrength";
pub const FIELD_FACE_ALIGNMENT: &str = "faceAlignment";

pub const PARAM_MIN: u8 = 0;
pub const PARAM_MAX: u8 = 100;
pub const DEFAULT_PARAM: u8 = 50;

/// Suggested file name for a client-side download of the result.
pub const DOWNLOAD_FILE_NAME: &str = "face-swap-result.jpg";

/// Which of the two uploads a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    /// The image the face is taken from.
    Source,
    /// The image the face is placed into.
    Target,
}

impl ImageRole {
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Source => FIELD_SOURCE_IMAGE,
            Self::Target => FIELD_TARGET_IMAGE,
        }
    }

    /// Prefix of the generated on-disk name.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            FIELD_SOURCE_IMAGE => Some(Self::Source),
            FIELD_TARGET_IMAGE => Some(Self::Target),
            _ => None,
        }
    }
}

/// Tuning knobs forwarded to the external command, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub blend_strength: u8,
    pub face_alignment: u8,
}

impl Default for SwapParams {
    fn default() -> Self {
        Self {
            blend_strength: DEFAULT_PARAM,
            face_alignment: DEFAULT_PARAM,
        }
    }
}

impl SwapParams {
    pub fn new(blend_strength: i64, face_alignment: i64) -> Self {
        Self {
            blend_strength: clamp_param(blend_strength),
            face_alignment: clamp_param(face_alignment),
        }
    }

    /// Build params from the raw form values.
    ///
    /// Absent or empty values fall back to the default. Values that do not
    /// parse as integers are treated as absent; numeric values are clamped.
    pub fn from_form(blend_strength: Option<&str>, face_alignment: Option<&str>) -> Self {
        Self {
            blend_strength: parse_param(FIELD_BLEND_STRENGTH, blend_strength),
            face_alignment: parse_param(FIELD_FACE_ALIGNMENT, face_alignment),
        }
    }
}

/// Clamp an arbitrary integer into [PARAM_MIN, PARAM_MAX].
pub fn clamp_param(value: i64) -> u8 {
    value.clamp(PARAM_MIN as i64, PARAM_MAX as i64) as u8
}

fn parse_param(field: &str, raw: Option<&str>) -> u8 {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_PARAM;
    };
    match raw.parse::<i64>() {
        Ok(v) => clamp_param(v),
        Err(_) => {
            tracing::warn!(field, value = raw, "unparseable parameter; using default");
            DEFAULT_PARAM
        }
    }
}

/// Body of a successful swap response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub success: bool,
    /// Artifact reference, relative to the public storage prefix.
    pub result_image: String,
    /// Whatever the external command wrote to stdout, verbatim.
    pub message: String,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

//! Job DTOs
//!
//! This module contains the request and result types for the remote job
//! queue. The request is a tagged union on the `action` field; the worker
//! ignores unknown fields, so nothing is validated on the client side.

use serde::{Deserialize, Serialize};

/// Seed sentinel: let the engine pick a random seed.
pub const RANDOM_SEED: i64 = -1;

// ============================================================================
// Job Requests
// ============================================================================

/// A job request, discriminated by the `action` tag.
///
/// Serialized as `{"action": "generate", ...fields}` and wrapped in
/// `{"input": ...}` by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum JobRequest {
    Generate(GenerateParams),
    Edit(EditParams),
    Detailer(DetailerParams),
}

/// Coarse job classification, used for gallery filtering and queue display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Generate,
    Edit,
    Detailer,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generate => "generate",
            JobKind::Edit => "edit",
            JobKind::Detailer => "detailer",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(JobKind::Generate),
            "edit" => Ok(JobKind::Edit),
            "detailer" => Ok(JobKind::Detailer),
            other => Err(format!("unknown job kind '{}'", other)),
        }
    }
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Generate(_) => JobKind::Generate,
            JobRequest::Edit(_) => JobKind::Edit,
            JobRequest::Detailer(_) => JobKind::Detailer,
        }
    }

    /// Positive prompt of the request, if the variant carries one.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            JobRequest::Generate(p) => Some(p.prompt.as_str()),
            JobRequest::Edit(p) => Some(p.prompt.as_str()),
            JobRequest::Detailer(_) => None,
        }
    }

    /// Requested seed, if the variant carries one.
    pub fn seed(&self) -> Option<i64> {
        match self {
            JobRequest::Generate(p) => p.seed,
            JobRequest::Edit(p) => p.seed,
            JobRequest::Detailer(p) => p.seed,
        }
    }
}

/// Text-to-image with face identity, ControlNet guidance, and post-processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerateParams {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    /// `-1` asks the engine to pick a random seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_lora: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_lora_strength: Option<f64>,
    /// "pulid" or "ip_adapter".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulid_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_adapter_strength: Option<f64>,
    /// Base64 face reference for PuLID / IP-Adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canny_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlnet_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canny_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upscale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_daemon: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_detailer_denoise: Option<f64>,
    /// Worker-side auto-download of a LoRA file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_name: Option<String>,
}

/// Image-to-image scene/outfit change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EditParams {
    pub prompt: String,
    /// Base64 source image; the worker rejects the job without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denoise: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_lora: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_lora_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upscale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_height: Option<u32>,
}

/// Face detailing + upscale of an existing image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetailerParams {
    /// Base64 source image; the worker rejects the job without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_detailer_denoise: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_by: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

// ============================================================================
// Job Results
// ============================================================================

/// Remote job lifecycle state.
///
/// `IN_QUEUE → IN_PROGRESS → {COMPLETED | FAILED | CANCELLED}`; terminal
/// states never transition back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InQueue => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker output payload attached to a terminal result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    /// Seed actually used; may differ from the requested `-1` sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for `POST /runsync` and `GET /status/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    #[serde(default)]
    pub id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// Base64 images of the output, empty when none were produced.
    pub fn images(&self) -> &[String] {
        self.output
            .as_ref()
            .and_then(|o| o.images.as_deref())
            .unwrap_or(&[])
    }

    /// Seed the engine actually used, when reported.
    pub fn seed(&self) -> Option<i64> {
        self.output.as_ref().and_then(|o| o.seed)
    }

    /// Engine-reported error: `output.error` wins over the top-level field.
    pub fn error_message(&self) -> Option<&str> {
        self.output
            .as_ref()
            .and_then(|o| o.error.as_deref())
            .or(self.error.as_deref())
    }
}

/// Response for `POST /run` (async submit acknowledgement).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

impl SubmitResponse {
    /// Assigned job id; a missing or empty id means the submit failed.
    pub fn job_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

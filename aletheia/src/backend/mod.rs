use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// Client side of the analysis backend (`/analyze/text`, `/analyze/image`)
#[async_trait::async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Classify a text message
    async fn analyze_text(&self, text: &str) -> Result<Verdict>;

    /// Classify an image (OCR + description happen on the backend)
    async fn analyze_image(&self, image: ImageUpload) -> Result<Verdict>;
}

/// Raw image bytes as downloaded from the chat network
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Request body for `POST /analyze/text`
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub text: &'a str,
}

/// Verdict returned by the backend for one message.
///
/// Optional fields come back as `null` when the backend has nothing to say,
/// so they all decode to empty values rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub is_misinformation: bool,
    pub confidence: f64,
    #[serde(default = "default_is_news", deserialize_with = "null_as_true")]
    pub is_news: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub evidence: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources_checked: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommendation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_type: String,
    /// Image analyses only
    #[serde(default)]
    pub extracted_text: Option<String>,
    /// Image analyses only
    #[serde(default)]
    pub image_description: Option<String>,
}

fn default_is_news() -> bool {
    true
}

fn null_as_true<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub mod remote;

use serde::{Deserialize, Serialize};

/// Real-time sampling progress pushed over ComfyUI's WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProgressUpdate {
    #[serde(rename = "value")]
    pub current_step: u32,
    #[serde(rename = "max")]
    pub total_steps: u32,
}

impl ProgressUpdate {
    /// Completion as a percentage, `0.0` when the total is unknown.
    pub fn percent(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.current_step as f64 / self.total_steps as f64) * 100.0
    }
}

/// Reference to an image stored in ComfyUI's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_image_type")]
    pub img_type: String,
}

fn default_image_type() -> String {
    "output".to_string()
}

/// A finished generation: where the image lives and how to save it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub image: ImageRef,
    /// `/view` URL usable directly as an image source or download link.
    pub image_url: String,
    /// Suggested local filename, `comfyui-generated-{unix_millis}.png`.
    pub download_name: String,
    /// The seed actually sent to the sampler.
    pub seed: i64,
    pub prompt_id: Option<String>,
}

impl GenerationResult {
    pub fn new(image: ImageRef, image_url: String, seed: i64, prompt_id: Option<String>) -> Self {
        Self {
            image,
            image_url,
            download_name: download_name(chrono::Utc::now().timestamp_millis()),
            seed,
            prompt_id,
        }
    }
}

/// Local filename for a downloaded image generated at `millis`.
pub fn download_name(millis: i64) -> String {
    format!("comfyui-generated-{}.png", millis)
}

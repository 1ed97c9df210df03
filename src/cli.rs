use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use comfy_prompt::config::DEFAULT_SERVER_URL;
use comfy_prompt::{
    ComfyError, GenerationParameters, GenerationStatus, GeneratorConfig, Sampler, Scheduler,
};

/// Command-line options for `comfy-prompt`.
///
/// Generation flags override the built-in defaults (1024x1024, 30 steps,
/// cfg 7, dpmpp_2m/karras, random seed, dreamshaper_8 with the blindbox
/// LoRA at 0.75). Server settings can also come from the environment or a
/// `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "comfy-prompt",
    version,
    about = "Generate an image from a text prompt with a ComfyUI server"
)]
pub struct CliArgs {
    /// Text prompt. Required unless --interactive, --check or --list-models.
    #[arg(required_unless_present_any = ["interactive", "check", "list_models"])]
    pub prompt: Option<String>,

    /// Base URL of the ComfyUI server.
    ///
    /// Environment variable: `COMFYUI_URL`
    #[arg(long, env = "COMFYUI_URL", default_value_t = String::from(DEFAULT_SERVER_URL))]
    pub url: String,

    /// Fixed client session id instead of a random one.
    ///
    /// Environment variable: `COMFYUI_CLIENT_ID`
    #[arg(long, env = "COMFYUI_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Per-request HTTP timeout in seconds. Completion itself never times out.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Negative prompt.
    #[arg(long)]
    pub negative: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    /// Number of sampling steps.
    #[arg(long)]
    pub steps: Option<u32>,

    /// Classifier-free guidance scale.
    #[arg(long, value_parser = finite_f64)]
    pub cfg: Option<f64>,

    /// euler, euler_ancestral, dpmpp_2m, dpmpp_sde or ddim.
    #[arg(long)]
    pub sampler: Option<Sampler>,

    /// normal, karras, exponential, simple or sgm_uniform.
    #[arg(long)]
    pub scheduler: Option<Scheduler>,

    /// Sampler seed; -1 draws a new random seed per image.
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,

    /// Checkpoint filename.
    #[arg(long)]
    pub model: Option<String>,

    /// LoRA filename.
    #[arg(long, conflicts_with = "no_lora")]
    pub lora: Option<String>,

    #[arg(long, conflicts_with = "no_lora", value_parser = finite_f64)]
    pub lora_strength: Option<f64>,

    /// Skip the LoRA and feed the checkpoint straight into the sampler.
    #[arg(long, default_value_t = false)]
    pub no_lora: bool,

    /// Download each finished image into this directory.
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Read one prompt per line from stdin, reusing the session.
    #[arg(short, long, default_value_t = false)]
    pub interactive: bool,

    /// Only check whether the server is reachable.
    #[arg(long, default_value_t = false)]
    pub check: bool,

    /// List checkpoints, LoRAs, samplers and schedulers known to the server.
    #[arg(long, default_value_t = false)]
    pub list_models: bool,

    /// Log more (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    pub fn generator_config(&self) -> GeneratorConfig {
        let mut builder = GeneratorConfig::builder().with_base_url(self.url.clone());
        if let Some(id) = &self.client_id {
            builder = builder.with_client_id(id.clone());
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.with_request_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Defaults with every given flag applied, for `prompt`.
    pub fn parameters(&self, prompt: &str) -> GenerationParameters {
        let mut params = GenerationParameters::new(prompt);
        if let Some(negative) = &self.negative {
            params.negative_prompt = negative.clone();
        }
        if let Some(width) = self.width {
            params.width = width;
        }
        if let Some(height) = self.height {
            params.height = height;
        }
        if let Some(steps) = self.steps {
            params.steps = steps;
        }
        if let Some(cfg) = self.cfg {
            params.cfg = cfg;
        }
        if let Some(sampler) = self.sampler {
            params.sampler = sampler;
        }
        if let Some(scheduler) = self.scheduler {
            params.scheduler = scheduler;
        }
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        if let Some(model) = &self.model {
            params.model = model.clone();
        }

        if self.no_lora {
            params.lora = None;
        } else if let Some(lora) = params.lora.as_mut() {
            if let Some(name) = &self.lora {
                lora.name = name.clone();
            }
            if let Some(strength) = self.lora_strength {
                lora.strength = strength;
            }
        }
        params
    }
}

/// JSON has no NaN or infinity, so those never reach the workflow.
fn finite_f64(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("'{}' is not a finite number", s))
    }
}

/// The message for `error` if nothing has shown it yet.
///
/// A failed generation was already rendered as `Error: ...` through its
/// status and a validation error was printed as is. Anything else, such as
/// a failed download after the image was ready, still needs reporting.
pub fn unreported_error(error: &ComfyError, status: &GenerationStatus) -> Option<String> {
    match (error, status) {
        (ComfyError::Validation(_), _) => None,
        (_, GenerationStatus::Failed(_)) => None,
        _ => Some(format!("Error: {}", error)),
    }
}

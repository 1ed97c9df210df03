use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Seed value meaning "draw a fresh random seed for every request".
pub const RANDOM_SEED: i64 = -1;

pub const DEFAULT_MODEL: &str = "dreamshaper_8.safetensors";
pub const DEFAULT_LORA: &str = "blindbox_v1_mix.safetensors";
pub const DEFAULT_LORA_STRENGTH: f64 = 0.75;
pub const DEFAULT_NEGATIVE_PROMPT: &str = "(worst quality, low quality:1.4), (bad anatomy), text, error, missing fingers, extra digit, fewer digits, cropped, jpeg artifacts, signature, watermark, username, blurry, deformed face";

/// A sampler or scheduler name that ComfyUI does not know.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseOptionError {
    kind: &'static str,
    value: String,
    expected: String,
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The identifier ComfyUI expects in the workflow.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseOptionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ParseOptionError {
                        kind: $kind,
                        value: other.to_string(),
                        expected: [$($wire),+].join(", "),
                    }),
                }
            }
        }
    };
}

wire_enum!(
    /// Sampling algorithm used by the `KSampler` node.
    Sampler, "sampler", {
        Euler => "euler",
        EulerAncestral => "euler_ancestral",
        Dpmpp2m => "dpmpp_2m",
        DpmppSde => "dpmpp_sde",
        Ddim => "ddim",
    }
);

wire_enum!(
    /// Noise schedule used by the `KSampler` node.
    Scheduler, "scheduler", {
        Normal => "normal",
        Karras => "karras",
        Exponential => "exponential",
        Simple => "simple",
        SgmUniform => "sgm_uniform",
    }
);

/// A LoRA applied between the checkpoint and the sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleAdapter {
    pub name: String,
    pub strength: f64,
}

impl StyleAdapter {
    pub fn new(name: impl Into<String>, strength: f64) -> Self {
        Self {
            name: name.into(),
            strength,
        }
    }
}

/// Everything the user controls for a single generation.
///
/// Values are passed through to the workflow uninterpreted; only the seed
/// is resolved (see [`RANDOM_SEED`]).
///
/// # Example
/// ```
/// use comfy_prompt::{GenerationParameters, Sampler};
///
/// let params = GenerationParameters::new("a red fox")
///     .size(768, 512)
///     .steps(20)
///     .sampler(Sampler::Euler)
///     .without_lora();
///
/// assert_eq!(params.prompt, "a red fox");
/// assert!(params.lora.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParameters {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    pub sampler: Sampler,
    pub scheduler: Scheduler,
    pub seed: i64,
    pub model: String,
    pub lora: Option<StyleAdapter>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            width: 1024,
            height: 1024,
            steps: 30,
            cfg: 7.0,
            sampler: Sampler::Dpmpp2m,
            scheduler: Scheduler::Karras,
            seed: RANDOM_SEED,
            model: DEFAULT_MODEL.to_string(),
            lora: Some(StyleAdapter::new(DEFAULT_LORA, DEFAULT_LORA_STRENGTH)),
        }
    }
}

impl GenerationParameters {
    /// Default parameters with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Set the negative prompt.
    pub fn negative(mut self, prompt: impl Into<String>) -> Self {
        self.negative_prompt = prompt.into();
        self
    }

    /// Set output dimensions.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    /// Set the classifier-free guidance scale.
    pub fn cfg(mut self, cfg: f64) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set a specific seed. Use [`RANDOM_SEED`] (the default) for random.
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the checkpoint filename.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn lora(mut self, name: impl Into<String>, strength: f64) -> Self {
        self.lora = Some(StyleAdapter::new(name, strength));
        self
    }

    /// Wire the checkpoint straight into the sampler.
    pub fn without_lora(mut self) -> Self {
        self.lora = None;
        self
    }
}

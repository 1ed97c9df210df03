//! # comfy-prompt
//!
//! Prompt-to-image client for [ComfyUI](https://github.com/comfyanonymous/ComfyUI).
//!
//! Builds a fixed txt2img workflow from a handful of parameters, submits it
//! over HTTP, and waits for the `executed` notification of the `SaveImage`
//! node on ComfyUI's WebSocket to resolve the image URL.
//!
//! ## Quick Start
//!
//! ```no_run
//! use comfy_prompt::{GenerationParameters, Generator, GeneratorConfig};
//!
//! # async fn example() -> comfy_prompt::Result<()> {
//! let config = GeneratorConfig::builder()
//!     .with_base_url("http://127.0.0.1:8188")
//!     .build();
//! let mut generator = Generator::new(config)?;
//!
//! let params = GenerationParameters::new("a red fox in the snow")
//!     .steps(25)
//!     .seed(-1);
//!
//! let result = generator
//!     .generate_with_updates(&params, |status| println!("{}", status))
//!     .await?;
//!
//! let path = generator.save(&result, std::path::Path::new(".")).await?;
//! println!("saved {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod generator;
pub mod params;
pub mod session;
pub mod state;
pub mod types;
pub mod workflow;

pub use channel::{ChannelEvent, NotificationChannel};
pub use client::ComfyClient;
pub use config::GeneratorConfig;
pub use error::{ComfyError, Result};
pub use generator::Generator;
pub use params::{GenerationParameters, Sampler, Scheduler, StyleAdapter};
pub use session::ClientSession;
pub use state::{GenerationState, GenerationStatus};
pub use types::{GenerationResult, ImageRef, ProgressUpdate};
pub use workflow::WorkflowDocument;

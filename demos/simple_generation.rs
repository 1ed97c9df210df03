//! Generate a single image from a text prompt and save it.
//!
//! Requires a running ComfyUI instance at http://127.0.0.1:8188 (or
//! `COMFYUI_URL`) with the default checkpoint and LoRA installed.
//!
//! ```sh
//! cargo run --example simple_generation
//! ```

use comfy_prompt::{GenerationParameters, Generator, GeneratorConfig};
use std::path::Path;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let url = std::env::var("COMFYUI_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".into());
    let mut generator = Generator::new(GeneratorConfig::builder().with_base_url(url).build())?;

    // Check connection
    if !generator.client().health().await? {
        eprintln!("ComfyUI is not responding");
        return Ok(());
    }
    println!("ComfyUI is online");

    let params = GenerationParameters::new("a red fox in a snowy forest, soft light")
        .steps(25)
        .cfg(7.0);

    // Prints every state transition: submitting, progress steps, result.
    let result = generator
        .generate_with_updates(&params, |status| println!("{}", status))
        .await?;
    println!("Seed: {}", result.seed);

    let path = generator.save(&result, Path::new(".")).await?;
    println!("Saved: {}", path.display());

    Ok(())
}

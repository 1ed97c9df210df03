//! Demonstrate the workflow builder and model discovery.
//!
//! Lists available checkpoints, LoRAs, samplers, and schedulers, then builds
//! a customized workflow and prints the JSON that would be sent to `/prompt`.
//!
//! ```sh
//! cargo run --example workflow_builder
//! ```

use comfy_prompt::{ComfyClient, GenerationParameters, Sampler, Scheduler};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let client = ComfyClient::new("http://127.0.0.1:8188");

    // Discover available options
    let checkpoints = client.checkpoints().await?;
    let loras = client.loras().await?;
    let samplers = client.samplers().await?;
    let schedulers = client.schedulers().await?;

    for (title, names) in [
        ("Checkpoints", &checkpoints),
        ("LoRAs", &loras),
        ("Samplers", &samplers),
        ("Schedulers", &schedulers),
    ] {
        println!("{} ({}):", title, names.len());
        for n in names {
            println!("  - {}", n);
        }
    }

    let mut params = GenerationParameters::new("masterpiece, best quality, landscape painting")
        .negative("lowres, blurry, bad anatomy, watermark")
        .size(1024, 768)
        .steps(30)
        .cfg(6.5)
        .sampler(Sampler::EulerAncestral)
        .scheduler(Scheduler::Normal)
        .seed(42);
    if let Some(checkpoint) = checkpoints.first() {
        params = params.model(checkpoint);
    }
    match loras.first() {
        Some(lora) => params = params.lora(lora, 0.8),
        None => params = params.without_lora(),
    }

    let (workflow, seed) = params.build();
    println!("\nWorkflow JSON:");
    println!("{}", serde_json::to_string_pretty(&workflow)?);
    println!("\nSeed: {}", seed);

    Ok(())
}

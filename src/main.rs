mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::CliArgs;
use comfy_prompt::{ComfyError, GenerationStatus, Generator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let mut generator = Generator::new(args.generator_config())?;
    tracing::debug!(
        url = %generator.client().endpoint(),
        session = %generator.client().session(),
        "client ready"
    );

    if args.check {
        check(&generator).await?;
        return Ok(ExitCode::SUCCESS);
    }
    if args.list_models {
        list_models(&generator).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.interactive {
        println!("Enter one prompt per line, Ctrl-D to quit.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            // The session stays usable for the next line either way.
            run_reported(&mut generator, &args, &line).await;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let prompt = args.prompt.clone().unwrap_or_default();
    if run_reported(&mut generator, &args, &prompt).await {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run one prompt and print any error the status updates did not show.
/// Returns whether it succeeded.
async fn run_reported(generator: &mut Generator, args: &CliArgs, prompt: &str) -> bool {
    match run_once(generator, args, prompt).await {
        Ok(()) => true,
        Err(e) => {
            if let Some(message) = cli::unreported_error(&e, generator.status()) {
                eprintln!("{}", message);
            }
            false
        }
    }
}

fn render(status: &GenerationStatus) {
    println!("{}", status);
}

async fn run_once(
    generator: &mut Generator,
    args: &CliArgs,
    prompt: &str,
) -> comfy_prompt::Result<()> {
    let params = args.parameters(prompt);
    let result = match generator.generate_with_updates(&params, render).await {
        Ok(result) => result,
        Err(e) => {
            if let ComfyError::Validation(message) = &e {
                println!("{}", message);
            }
            return Err(e);
        }
    };

    println!("Seed: {}", result.seed);
    if let Some(dir) = &args.save_dir {
        let path = generator.save(&result, dir).await?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

async fn check(generator: &Generator) -> anyhow::Result<()> {
    let client = generator.client();
    if client.health().await? {
        println!("ComfyUI is online at {}", client.endpoint());
        Ok(())
    } else {
        anyhow::bail!("ComfyUI at {} is not responding", client.endpoint())
    }
}

async fn list_models(generator: &Generator) -> anyhow::Result<()> {
    let client = generator.client();
    let sections = [
        ("Checkpoints", client.checkpoints().await?),
        ("LoRAs", client.loras().await?),
        ("Samplers", client.samplers().await?),
        ("Schedulers", client.schedulers().await?),
    ];
    for (title, names) in sections {
        println!("{} ({}):", title, names.len());
        for name in &names {
            println!("  - {}", name);
        }
    }
    Ok(())
}

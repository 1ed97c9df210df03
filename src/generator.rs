use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, NotificationChannel};
use crate::client::ComfyClient;
use crate::config::GeneratorConfig;
use crate::error::{ComfyError, Result};
use crate::params::GenerationParameters;
use crate::session::ClientSession;
use crate::state::{GenerationState, GenerationStatus};
use crate::types::GenerationResult;

/// Drives one generation at a time against a ComfyUI server.
///
/// Owns the HTTP client, the notification channel and the state machine.
/// The channel is opened lazily on the first submission and then reused.
/// Generations are serialized by `&mut self`.
///
/// # Example
/// ```no_run
/// use comfy_prompt::{GenerationParameters, Generator, GeneratorConfig};
///
/// # async fn example() -> comfy_prompt::Result<()> {
/// let mut generator = Generator::new(GeneratorConfig::default())?;
/// let result = generator
///     .generate(&GenerationParameters::new("a red fox"))
///     .await?;
/// println!("{}", result.image_url);
/// # Ok(())
/// # }
/// ```
pub struct Generator {
    client: ComfyClient,
    channel: NotificationChannel,
    state: GenerationState,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let session = config
            .client_id
            .map(ClientSession::with_id)
            .unwrap_or_default();
        let mut client = ComfyClient::new(config.base_url).with_session(session);
        if let Some(timeout) = config.request_timeout {
            client = client.with_request_timeout(timeout);
        }
        let channel = NotificationChannel::new(client.ws_url()?, config.terminal_node);

        Ok(Self {
            client,
            channel,
            state: GenerationState::new(),
        })
    }

    pub fn client(&self) -> &ComfyClient {
        &self.client
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn status(&self) -> &GenerationStatus {
        self.state.status()
    }

    /// Submit one generation and wait for its image.
    pub async fn generate(&mut self, params: &GenerationParameters) -> Result<GenerationResult> {
        self.generate_with_updates(params, |_| {}).await
    }

    /// Like [`generate`](Self::generate), calling `on_update` after every
    /// state transition and progress step.
    ///
    /// A blank prompt returns [`ComfyError::Validation`] without touching
    /// the network. There is no completion timeout.
    pub async fn generate_with_updates<F>(
        &mut self,
        params: &GenerationParameters,
        mut on_update: F,
    ) -> Result<GenerationResult>
    where
        F: FnMut(&GenerationStatus),
    {
        self.state.begin(&params.prompt)?;
        on_update(self.state.status());

        let outcome = self.run(params, &mut on_update).await;
        match &outcome {
            Ok(result) => {
                info!(filename = %result.image.filename, seed = result.seed, "image ready");
                self.state.complete(result.clone());
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                self.state.fail(e);
            }
        }
        on_update(self.state.status());
        outcome
    }

    async fn run<F>(
        &mut self,
        params: &GenerationParameters,
        on_update: &mut F,
    ) -> Result<GenerationResult>
    where
        F: FnMut(&GenerationStatus),
    {
        self.channel.ensure_connected().await?;
        let stale = self.channel.discard_pending();
        if stale > 0 {
            debug!(stale, "discarded events from an earlier generation");
        }

        let (workflow, seed) = params.build();
        debug!(seed, "workflow built");
        let prompt_id = self.client.queue_prompt(&workflow).await?;
        self.state.accepted(prompt_id.clone());
        on_update(self.state.status());

        // Events are only read after acceptance, so an early completion is
        // still matched against the id the server returned.
        loop {
            let Some(event) = self.channel.next_event().await else {
                return Err(ComfyError::ChannelClosed);
            };
            if !event.belongs_to(prompt_id.as_deref()) {
                debug!(
                    event_prompt = event.prompt_id().unwrap_or("-"),
                    "ignoring event for another prompt"
                );
                continue;
            }
            match event {
                ChannelEvent::Progress { update, .. } => {
                    self.state.progress(update);
                    on_update(self.state.status());
                }
                ChannelEvent::Completed { image, .. } => {
                    let image_url = self.client.image_url(&image)?;
                    return Ok(GenerationResult::new(image, image_url, seed, prompt_id));
                }
            }
        }
    }

    /// Download the result's image into `dir` under its `download_name`.
    pub async fn save(&self, result: &GenerationResult, dir: &Path) -> Result<PathBuf> {
        let bytes = self.client.image(&result.image).await?;
        let path = dir.join(&result.download_name);
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "image saved");
        Ok(path)
    }
}

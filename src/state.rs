use std::fmt;

use crate::error::{ComfyError, Result};
use crate::types::{GenerationResult, ProgressUpdate};

/// Message shown when a submission has no prompt text.
pub const EMPTY_PROMPT_MESSAGE: &str = "Enter a prompt";

/// Where a generation currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    Idle,
    Submitting,
    AwaitingCompletion {
        prompt_id: Option<String>,
        progress: Option<ProgressUpdate>,
    },
    Completed(GenerationResult),
    Failed(String),
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationStatus::Idle => write!(f, "Ready"),
            GenerationStatus::Submitting => write!(f, "Submitting workflow..."),
            GenerationStatus::AwaitingCompletion {
                progress: Some(p), ..
            } => write!(
                f,
                "Generating: step {}/{} ({:.0}%)",
                p.current_step,
                p.total_steps,
                p.percent()
            ),
            GenerationStatus::AwaitingCompletion { .. } => write!(f, "Generating..."),
            GenerationStatus::Completed(result) => write!(f, "Image ready: {}", result.image_url),
            GenerationStatus::Failed(message) => write!(f, "Error: {}", message),
        }
    }
}

/// The orchestrator's state machine, free of any I/O.
///
/// `Idle → Submitting → AwaitingCompletion → Completed | Failed`, and from
/// `Completed` or `Failed` back to `Submitting` on the next submission.
#[derive(Debug, Clone)]
pub struct GenerationState {
    status: GenerationStatus,
    validation: Option<String>,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            status: GenerationStatus::Idle,
            validation: None,
        }
    }
}

impl GenerationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &GenerationStatus {
        &self.status
    }

    /// The message left by the last rejected submission, if any.
    pub fn validation(&self) -> Option<&str> {
        self.validation.as_deref()
    }

    /// Whether a submission is between `begin` and its outcome.
    pub fn is_generating(&self) -> bool {
        matches!(
            self.status,
            GenerationStatus::Submitting | GenerationStatus::AwaitingCompletion { .. }
        )
    }

    /// The last completed image, if the state currently holds one.
    pub fn result(&self) -> Option<&GenerationResult> {
        match &self.status {
            GenerationStatus::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// Start a submission.
    ///
    /// A blank prompt leaves the status as it was and records a validation
    /// message. Otherwise any previous result or error is discarded.
    pub fn begin(&mut self, prompt: &str) -> Result<()> {
        if prompt.trim().is_empty() {
            self.validation = Some(EMPTY_PROMPT_MESSAGE.to_string());
            return Err(ComfyError::Validation(EMPTY_PROMPT_MESSAGE.to_string()));
        }
        self.validation = None;
        self.status = GenerationStatus::Submitting;
        Ok(())
    }

    /// The server accepted the workflow.
    pub fn accepted(&mut self, prompt_id: Option<String>) {
        if matches!(self.status, GenerationStatus::Submitting) {
            self.status = GenerationStatus::AwaitingCompletion {
                prompt_id,
                progress: None,
            };
        }
    }

    pub fn progress(&mut self, update: ProgressUpdate) {
        if let GenerationStatus::AwaitingCompletion { progress, .. } = &mut self.status {
            *progress = Some(update);
        }
    }

    pub fn complete(&mut self, result: GenerationResult) {
        if self.is_generating() {
            self.status = GenerationStatus::Completed(result);
        }
    }

    pub fn fail(&mut self, error: &ComfyError) {
        if self.is_generating() {
            self.status = GenerationStatus::Failed(error.to_string());
        }
    }
}

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::{GenerationParameters, StyleAdapter, RANDOM_SEED};

pub const SAMPLER_NODE: &str = "3";
pub const CHECKPOINT_NODE: &str = "4";
pub const LATENT_NODE: &str = "5";
pub const POSITIVE_NODE: &str = "6";
pub const NEGATIVE_NODE: &str = "7";
pub const DECODE_NODE: &str = "8";
/// The `SaveImage` node; its `executed` event marks the job as done.
pub const TERMINAL_NODE: &str = "9";
pub const LORA_NODE: &str = "11";

/// Exclusive upper bound for randomly drawn seeds.
pub const MAX_RANDOM_SEED: i64 = 1_000_000_000_000_000;

/// A reference to output slot `.1` of node `.0`, serialized as `["4", 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLink(pub String, pub u32);

/// A node input: either wired to another node or a literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeInput {
    Link(NodeLink),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub class_type: String,
    pub inputs: BTreeMap<String, NodeInput>,
}

/// A ComfyUI API-format workflow, keyed by node id.
///
/// Serializes to exactly the object `/prompt` expects under its `prompt` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowDocument {
    nodes: BTreeMap<String, WorkflowNode>,
}

impl WorkflowDocument {
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    /// The literal value of `input` on node `id`, if it is not a link.
    pub fn literal(&self, id: &str, input: &str) -> Option<&Value> {
        match self.node(id)?.inputs.get(input)? {
            NodeInput::Literal(value) => Some(value),
            NodeInput::Link(_) => None,
        }
    }

    pub fn link(&self, id: &str, input: &str) -> Option<&NodeLink> {
        match self.node(id)?.inputs.get(input)? {
            NodeInput::Link(link) => Some(link),
            NodeInput::Literal(_) => None,
        }
    }

    /// Every edge in the graph as `(consumer_id, input_name, link)`.
    pub fn links(&self) -> impl Iterator<Item = (&str, &str, &NodeLink)> {
        self.nodes.iter().flat_map(|(id, node)| {
            node.inputs.iter().filter_map(move |(name, input)| match input {
                NodeInput::Link(link) => Some((id.as_str(), name.as_str(), link)),
                NodeInput::Literal(_) => None,
            })
        })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, id: &str, class_type: &str, inputs: Vec<(&str, NodeInput)>) {
        self.nodes.insert(
            id.to_string(),
            WorkflowNode {
                class_type: class_type.to_string(),
                inputs: inputs
                    .into_iter()
                    .map(|(name, input)| (name.to_string(), input))
                    .collect(),
            },
        );
    }
}

fn lit(value: impl Into<Value>) -> NodeInput {
    NodeInput::Literal(value.into())
}

fn link(node: &str, slot: u32) -> NodeInput {
    NodeInput::Link(NodeLink(node.to_string(), slot))
}

impl GenerationParameters {
    /// Build the ComfyUI workflow and resolve the seed.
    ///
    /// Returns `(workflow, actual_seed)`. When `seed` is [`RANDOM_SEED`], a
    /// seed in `0..MAX_RANDOM_SEED` is drawn from the thread-local RNG.
    ///
    /// # Example
    /// ```
    /// use comfy_prompt::GenerationParameters;
    /// use comfy_prompt::workflow::{POSITIVE_NODE, SAMPLER_NODE};
    ///
    /// let (workflow, seed) = GenerationParameters::new("a red fox").build();
    ///
    /// assert_eq!(workflow.literal(POSITIVE_NODE, "text").unwrap(), "a red fox");
    /// assert_eq!(workflow.literal(SAMPLER_NODE, "seed").unwrap(), seed);
    /// ```
    pub fn build(&self) -> (WorkflowDocument, i64) {
        self.build_with_rng(&mut rand::rng())
    }

    /// Same as [`build`](Self::build) with an explicit random source.
    pub fn build_with_rng<R: Rng>(&self, rng: &mut R) -> (WorkflowDocument, i64) {
        let seed = if self.seed == RANDOM_SEED {
            rng.random_range(0..MAX_RANDOM_SEED)
        } else {
            self.seed
        };

        // Model and CLIP come from the LoRA when one is configured.
        let source = if self.lora.is_some() {
            LORA_NODE
        } else {
            CHECKPOINT_NODE
        };

        let mut doc = WorkflowDocument {
            nodes: BTreeMap::new(),
        };
        doc.insert(
            SAMPLER_NODE,
            "KSampler",
            vec![
                ("seed", lit(seed)),
                ("steps", lit(self.steps)),
                ("cfg", lit(self.cfg)),
                ("sampler_name", lit(self.sampler.as_str())),
                ("scheduler", lit(self.scheduler.as_str())),
                ("denoise", lit(1)),
                ("model", link(source, 0)),
                ("positive", link(POSITIVE_NODE, 0)),
                ("negative", link(NEGATIVE_NODE, 0)),
                ("latent_image", link(LATENT_NODE, 0)),
            ],
        );
        doc.insert(
            CHECKPOINT_NODE,
            "CheckpointLoaderSimple",
            vec![("ckpt_name", lit(self.model.as_str()))],
        );
        doc.insert(
            LATENT_NODE,
            "EmptyLatentImage",
            vec![
                ("width", lit(self.width)),
                ("height", lit(self.height)),
                ("batch_size", lit(1)),
            ],
        );
        doc.insert(
            POSITIVE_NODE,
            "CLIPTextEncode",
            vec![("text", lit(self.prompt.as_str())), ("clip", link(source, 1))],
        );
        doc.insert(
            NEGATIVE_NODE,
            "CLIPTextEncode",
            vec![
                ("text", lit(self.negative_prompt.as_str())),
                ("clip", link(source, 1)),
            ],
        );
        doc.insert(
            DECODE_NODE,
            "VAEDecode",
            vec![
                ("samples", link(SAMPLER_NODE, 0)),
                ("vae", link(CHECKPOINT_NODE, 2)),
            ],
        );
        doc.insert(
            TERMINAL_NODE,
            "SaveImage",
            vec![
                ("filename_prefix", lit("ComfyUI")),
                ("images", link(DECODE_NODE, 0)),
            ],
        );
        if let Some(lora) = &self.lora {
            doc.insert(
                LORA_NODE,
                "LoraLoader",
                vec![
                    ("lora_name", lit(lora.name.as_str())),
                    ("strength_model", lit(lora.strength)),
                    ("strength_clip", lit(1.0)),
                    ("model", link(CHECKPOINT_NODE, 0)),
                    ("clip", link(CHECKPOINT_NODE, 1)),
                ],
            );
        }

        (doc, seed)
    }

    /// Read the parameters back out of a workflow built by [`build`](Self::build).
    ///
    /// The seed comes back resolved. Returns `None` if a node or literal the
    /// builder always writes is missing or has the wrong type.
    pub fn from_workflow(doc: &WorkflowDocument) -> Option<Self> {
        let text = |id: &str, input: &str| -> Option<String> {
            doc.literal(id, input)?.as_str().map(str::to_string)
        };
        let uint = |id: &str, input: &str| -> Option<u32> {
            u32::try_from(doc.literal(id, input)?.as_u64()?).ok()
        };
        let float = |id: &str, input: &str| -> Option<f64> { doc.literal(id, input)?.as_f64() };

        let lora = match doc.node(LORA_NODE) {
            Some(_) => Some(StyleAdapter::new(
                text(LORA_NODE, "lora_name")?,
                float(LORA_NODE, "strength_model")?,
            )),
            None => None,
        };

        Some(Self {
            prompt: text(POSITIVE_NODE, "text")?,
            negative_prompt: text(NEGATIVE_NODE, "text")?,
            width: uint(LATENT_NODE, "width")?,
            height: uint(LATENT_NODE, "height")?,
            steps: uint(SAMPLER_NODE, "steps")?,
            cfg: float(SAMPLER_NODE, "cfg")?,
            sampler: text(SAMPLER_NODE, "sampler_name")?.parse().ok()?,
            scheduler: text(SAMPLER_NODE, "scheduler")?.parse().ok()?,
            seed: doc.literal(SAMPLER_NODE, "seed")?.as_i64()?,
            model: text(CHECKPOINT_NODE, "ckpt_name")?,
            lora,
        })
    }
}

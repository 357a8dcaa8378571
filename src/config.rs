//! Runtime configuration loaded from the environment.
//!
//! All knobs have built-in defaults so the pipeline runs with zero setup
//! against a local OpenAI-compatible gateway. `SYSTEM_PROMPT` and
//! `EXTRACTION_PROMPT` accept either an inline string or a path to a file
//! whose contents become the prompt.

use std::path::Path;

use crate::error::{DistillError, Result};

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert at analyzing meeting transcripts and strategic planning sessions.
Your job is to extract structured knowledge: decisions, ideas, questions, action items,
concepts, and terminology. Be precise and concise. Only extract items explicitly discussed;
do not infer unstated decisions. For each category, maintain the original context and
attribution where possible.";

const DEFAULT_EXTRACTION_PROMPT: &str = "\
Analyze this transcript and extract structured knowledge.

Respond with ONLY a valid JSON object matching this schema:
{schema}

Transcript:
{transcript}

Be literal; do not embellish or infer.";

pub const DEFAULT_EMBEDDING_MODEL: &str = "all-mpnet-base-v2";

/// One row of the size-tier table: sources smaller than `max_source_bytes`
/// use `chunk_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkTier {
    pub max_source_bytes: u64,
    pub chunk_size: usize,
}

/// Sources past the last threshold are capped at the largest tier so chunks
/// stay inside the gateway model's context window.
pub const DEFAULT_CHUNK_TIERS: &[ChunkTier] = &[
    ChunkTier {
        max_source_bytes: 1_000_000,
        chunk_size: 12_000,
    },
    ChunkTier {
        max_source_bytes: 10_000_000,
        chunk_size: 18_000,
    },
    ChunkTier {
        max_source_bytes: 50_000_000,
        chunk_size: 24_000,
    },
];

#[derive(Clone, Debug)]
pub struct DistillConfig {
    pub gateway_model: String,
    pub gateway_url: String,
    pub gateway_api_key: Option<String>,
    pub system_prompt: String,
    pub extraction_prompt: String,
    pub max_chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_retries: u32,
    /// When true, `max_chunk_size` wins over the tier table.
    pub chunk_size_override: bool,
    pub chunk_tiers: Vec<ChunkTier>,
    pub embedding_model: String,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            gateway_model: "qwen3-4b".into(),
            gateway_url: "http://localhost:8800/v1".into(),
            gateway_api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            extraction_prompt: DEFAULT_EXTRACTION_PROMPT.into(),
            max_chunk_size: 12_000,
            chunk_overlap: 200,
            max_retries: 3,
            chunk_size_override: false,
            chunk_tiers: DEFAULT_CHUNK_TIERS.to_vec(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
        }
    }
}

impl DistillConfig {
    /// Load configuration from the process environment, reading a `.env`
    /// file first if one is present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Ok(model) = std::env::var("GATEWAY_MODEL") {
            config.gateway_model = model;
        }
        if let Ok(url) = std::env::var("GATEWAY_URL") {
            config.gateway_url = url;
        }
        if let Ok(key) = std::env::var("GATEWAY_API_KEY") {
            config.gateway_api_key = Some(key);
        }
        if let Ok(size) = std::env::var("MAX_CHUNK_SIZE") {
            config.max_chunk_size = parse_chunk_size(&size)?;
            config.chunk_size_override = true;
        }
        if let Ok(overlap) = std::env::var("CHUNK_OVERLAP") {
            config.chunk_overlap = parse_env("CHUNK_OVERLAP", &overlap)?;
        }
        if let Ok(retries) = std::env::var("MAX_RETRIES") {
            config.max_retries = parse_env("MAX_RETRIES", &retries)?;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        config.system_prompt = resolve_prompt("SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT);
        config.extraction_prompt = resolve_prompt("EXTRACTION_PROMPT", DEFAULT_EXTRACTION_PROMPT);
        Ok(config)
    }

    /// Effective chunk size for a source of `original_bytes`, honoring an
    /// explicit override before walking the tier table.
    pub fn chunk_size_for(&self, original_bytes: u64) -> usize {
        if self.chunk_size_override {
            return self.max_chunk_size;
        }
        for tier in &self.chunk_tiers {
            if original_bytes < tier.max_source_bytes {
                return tier.chunk_size;
            }
        }
        self.chunk_tiers.last().map_or(self.max_chunk_size, |t| t.chunk_size)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DistillError::Config(format!("invalid {name}: {value:?}")))
}

/// A zero chunk size would make the splitter loop without progress, so it is
/// rejected up front.
fn parse_chunk_size(value: &str) -> Result<usize> {
    let size: usize = parse_env("MAX_CHUNK_SIZE", value)?;
    if size == 0 {
        return Err(DistillError::Config(
            "MAX_CHUNK_SIZE must be greater than zero".into(),
        ));
    }
    Ok(size)
}

/// A prompt env var may hold either the prompt text itself or a path to a
/// file containing it.
fn resolve_prompt(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) => {
            let path = Path::new(&value);
            if path.is_file() {
                std::fs::read_to_string(path).unwrap_or(value)
            } else {
                value
            }
        }
        Err(_) => default.to_string(),
    }
}

//! Remote speech services
//!
//! Three network-backed capabilities sit behind traits so the pipeline
//! can be driven by mocks in tests: synthesis (text to WAV), transcription
//! (WAV to text), and rewrite (text to cleaned-up text).

pub mod rewrite;
pub mod synthesis;
pub mod transcribe;

use async_trait::async_trait;

use crate::error::Result;

pub use rewrite::OpenAiRewrite;
pub use synthesis::OpenAiSynthesis;
pub use transcribe::OpenAiTranscription;

/// Base URL for the OpenAI-compatible API
pub const API_BASE: &str = "https://api.openai.com/v1";

/// Remote calls share a single bounded timeout; a hung service fails
/// the operation instead of wedging the pipeline.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Build the shared HTTP client for the speech services
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| crate::error::Error::RemoteService {
            service: "http",
            reason: e.to_string(),
        })
}

/// Turns text into spoken audio
#[async_trait]
pub trait SynthesisService: Send + Sync {
    /// Synthesize `text` with the given voice, returning WAV bytes.
    /// `instructions` carries optional tone guidance.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        instructions: Option<&str>,
    ) -> Result<Vec<u8>>;
}

/// Turns recorded audio into text
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, wav_bytes: &[u8]) -> Result<String>;
}

/// Rewrites text according to configured style rules
#[async_trait]
pub trait RewriteService: Send + Sync {
    async fn rewrite(&self, text: &str) -> Result<String>;
}

//! Text-to-speech over the OpenAI audio API

use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::speech::{SynthesisService, API_BASE};

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

pub struct OpenAiSynthesis {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiSynthesis {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl SynthesisService for OpenAiSynthesis {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        instructions: Option<&str>,
    ) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            // WAV keeps the playback path decode-free beyond hound
            response_format: "wav",
            instructions,
        };

        debug!(
            "Synthesizing {} chars with voice '{}' ({})",
            text.len(),
            voice,
            self.model
        );

        let response = self
            .client
            .post(format!("{}/audio/speech", API_BASE))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::remote("synthesis", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteService {
                service: "synthesis",
                reason: format!("{}: {}", status, body),
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::remote("synthesis", e))?;
        debug!("Received {} bytes of synthesized audio", audio.len());
        Ok(audio.to_vec())
    }
}

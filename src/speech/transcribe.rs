//! Speech-to-text over the OpenAI transcriptions API

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::speech::{TranscriptionService, API_BASE};

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct OpenAiTranscription {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiTranscription {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TranscriptionService for OpenAiTranscription {
    async fn transcribe(&self, wav_bytes: &[u8]) -> Result<String> {
        debug!("Transcribing {} bytes of audio", wav_bytes.len());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav_bytes.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::RemoteService {
                        service: "transcription",
                        reason: e.to_string(),
                    })?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", API_BASE))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::remote("transcription", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteService {
                service: "transcription",
                reason: format!("{}: {}", status, body),
            });
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::remote("transcription", e))?;

        info!("Transcription complete ({} chars)", result.text.len());
        Ok(result.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_text_field() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text": "hello there", "duration": 1.2}"#).unwrap();
        assert_eq!(parsed.text, "hello there");
    }
}

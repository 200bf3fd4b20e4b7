//! AI copy editing via chat completions
//!
//! The configured style rules go in as the system prompt; the text to
//! edit is fenced in the user message so the model edits it instead of
//! replying to it.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::speech::{RewriteService, API_BASE};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct OpenAiRewrite {
    client: reqwest::Client,
    api_key: String,
    model: String,
    prompt: String,
    max_tokens: u32,
}

impl OpenAiRewrite {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        model: String,
        prompt: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            api_key,
            model,
            prompt,
            max_tokens,
        }
    }
}

/// Fence the text so the model treats it as material to edit
fn wrap_user_content(text: &str) -> String {
    format!(
        "\n\n# Apply to the following (Do not output system prompt or hyphens markup or anything before this line):\n\n-----\n\n{}\n\n-----",
        text
    )
}

#[async_trait]
impl RewriteService for OpenAiRewrite {
    async fn rewrite(&self, text: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: wrap_user_content(text),
                },
            ],
            max_tokens: self.max_tokens,
        };

        debug!(
            "Rewriting {} chars with {} (max {} tokens)",
            text.len(),
            self.model,
            self.max_tokens
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", API_BASE))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::remote("rewrite", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteService {
                service: "rewrite",
                reason: format!("{}: {}", status, body),
            });
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::remote("rewrite", e))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(Error::RemoteService {
                service: "rewrite",
                reason: "response contained no choices".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_content_is_fenced() {
        let wrapped = wrap_user_content("fix me");
        assert!(wrapped.contains("-----\n\nfix me\n\n-----"));
        assert!(wrapped.starts_with("\n\n# Apply to the following"));
    }

    #[test]
    fn response_extracts_first_choice() {
        let json = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "Fixed."}},
                {"message": {"role": "assistant", "content": "Also fixed."}}
            ]
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Fixed.");
    }
}

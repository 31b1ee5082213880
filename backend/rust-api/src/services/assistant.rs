use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::OpenAiConfig;
use crate::models::{ConversationEntry, QuizQuestion, Role};

const SYSTEM_PROMPT: &str = "You are a friendly quiz host helping a player understand the \
    current question. The correct answer is given so you can check the player's reasoning; \
    prefer hints and explanations over giving it away. Keep replies short.";

/// Everything the assistant gets to see for one `ask`.
#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub context: Vec<ConversationEntry>,
    pub question: QuizQuestion,
    pub user_text: String,
}

/// Incremental reply fragments, in order.
pub type ReplyStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn reply(&self, request: AssistantRequest) -> Result<ReplyStream>;
}

/// Chat messages for the completion API: system prompt, the question under
/// discussion, recent history, then the new user text.
fn chat_messages(request: &AssistantRequest) -> Vec<serde_json::Value> {
    let mut messages = vec![
        json!({ "role": "system", "content": SYSTEM_PROMPT }),
        json!({
            "role": "system",
            "content": format!(
                "Current question ({}): {}\nOptions: {}\nCorrect answer: {}",
                request.question.topic,
                request.question.prompt,
                request.question.options.join(" | "),
                request.question.correct_answer
            ),
        }),
    ];
    messages.extend(request.context.iter().map(|entry| {
        let role = match entry.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        json!({ "role": role, "content": entry.content })
    }));
    messages.push(json!({ "role": "user", "content": request.user_text }));
    messages
}

/// Parses one `data:` line of a streamed chat completion. `Ok(None)` means
/// the line carries no text.
fn parse_stream_line(line: &str) -> Result<Option<String>> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let chunk: serde_json::Value =
        serde_json::from_str(data).context("Failed to parse assistant stream chunk")?;
    if let Some(message) = chunk["error"]["message"].as_str() {
        return Err(anyhow!("Assistant stream error: {}", message));
    }
    Ok(chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

/// Assistant backed by an OpenAI-compatible streaming chat completions API.
pub struct OpenAiAssistant {
    http_client: Client,
    config: OpenAiConfig,
}

impl OpenAiAssistant {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client for assistant")?;
        Ok(Self {
            http_client,
            config,
        })
    }
}

/// Splits a byte stream into lines. Bytes are buffered until a full line is
/// available so multi-byte characters split across chunks decode intact.
struct LineReader {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl LineReader {
    fn new(bytes: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self {
            bytes,
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Next complete line, or None at end of stream.
    async fn next_line(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Some(decode_line(line));
            }
            if self.finished {
                if self.buffer.is_empty() {
                    return None;
                }
                return Some(decode_line(std::mem::take(&mut self.buffer)));
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(anyhow!(e).context("Assistant stream interrupted")));
                }
                None => self.finished = true,
            }
        }
    }
}

fn decode_line(line: Vec<u8>) -> Result<String> {
    String::from_utf8(line).context("Assistant stream line is not valid UTF-8")
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn reply(&self, request: AssistantRequest) -> Result<ReplyStream> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": chat_messages(&request),
            "stream": true,
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to call assistant")?;

        if !response.status().is_success() {
            anyhow::bail!("Assistant returned status: {}", response.status());
        }

        let reader = LineReader::new(response.bytes_stream().boxed());

        let fragments = stream::unfold(reader, |mut reader| async move {
            loop {
                match reader.next_line().await? {
                    Ok(line) => match parse_stream_line(&line) {
                        Ok(Some(text)) => return Some((Ok(text), reader)),
                        Ok(None) => continue,
                        Err(e) => {
                            reader.finished = true;
                            reader.buffer.clear();
                            return Some((Err(e), reader));
                        }
                    },
                    Err(e) => return Some((Err(e), reader)),
                }
            }
        });

        Ok(fragments.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::sample_question;

    #[test]
    fn parses_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_stream_line(line).unwrap(), Some("Hel".to_string()));
    }

    #[test]
    fn ignores_done_and_blank_lines() {
        assert_eq!(parse_stream_line("data: [DONE]").unwrap(), None);
        assert_eq!(parse_stream_line("").unwrap(), None);
        assert_eq!(parse_stream_line(": keep-alive").unwrap(), None);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_line(role_only).unwrap(), None);
    }

    #[test]
    fn stream_error_payload_is_an_error() {
        let line = r#"data: {"error":{"message":"rate limited"}}"#;
        assert!(parse_stream_line(line).is_err());
        assert!(parse_stream_line("data: {not json").is_err());
    }

    #[test]
    fn chat_messages_include_question_and_history() {
        let request = AssistantRequest {
            context: vec![
                ConversationEntry::user("earlier"),
                ConversationEntry::assistant("reply"),
            ],
            question: sample_question("What is Rust?", "A language"),
            user_text: "hint please".to_string(),
        };

        let messages = chat_messages(&request);

        assert_eq!(messages.len(), 5);
        assert!(messages[1]["content"]
            .as_str()
            .unwrap()
            .contains("What is Rust?"));
        let question_context = messages[1]["content"].as_str().unwrap();
        assert!(question_context.contains("Correct answer: A language"));
        assert_eq!(messages[3]["role"], "assistant");
        assert_eq!(messages[4]["content"], "hint please");
    }

    #[tokio::test]
    async fn line_reader_keeps_characters_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{e9}').unwrap() + 1;
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split])),
            Ok(Bytes::copy_from_slice(&bytes[split..])),
        ];
        let mut reader = LineReader::new(stream::iter(chunks).boxed());

        let decoded = reader.next_line().await.unwrap().unwrap();

        assert_eq!(parse_stream_line(&decoded).unwrap(), Some("caf\u{e9}".to_string()));
        assert!(reader.next_line().await.is_none());
    }
}

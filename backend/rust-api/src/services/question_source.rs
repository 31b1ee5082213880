use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::config::OpenAiConfig;
use crate::error::QuizError;
use crate::metrics::QUESTION_GENERATION_TOTAL;
use crate::models::{BatchSource, PendingRequest, QuestionBatch, QuizQuestion};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// External generator of question batches. Implementations return the raw
/// questions; validation happens in [`fetch_batch`].
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn request_batch(
        &self,
        topic: &str,
        difficulty: u32,
        count: usize,
    ) -> Result<Vec<QuizQuestion>>;
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub attempts: usize,
    pub backoff: Duration,
    pub fallback_enabled: bool,
}

/// Rejects the whole batch if any question breaks the schema.
pub fn validate_batch(questions: &[QuizQuestion]) -> Result<(), QuizError> {
    if questions.is_empty() {
        return Err(QuizError::MalformedBatch(
            "question source returned no questions".to_string(),
        ));
    }
    for (index, question) in questions.iter().enumerate() {
        question
            .validate()
            .map_err(|e| QuizError::MalformedBatch(format!("question {}: {}", index, e)))?;
    }
    Ok(())
}

/// Requests a batch with bounded retries, validating every response, and
/// falls back to the static set when that is enabled.
pub async fn fetch_batch(
    source: &dyn QuestionSource,
    request: &PendingRequest,
    policy: &FetchPolicy,
) -> Result<QuestionBatch, QuizError> {
    let retry_cfg = RetryConfig::new(policy.attempts, policy.backoff);

    let result = retry_async_with_config(retry_cfg, || async {
        let questions = source
            .request_batch(&request.topic, request.difficulty, request.count)
            .await
            .map_err(|e| {
                tracing::warn!(
                    "Question source failed for topic={} difficulty={}: {:#}",
                    request.topic,
                    request.difficulty,
                    e
                );
                QuizError::GenerationFailure(e.to_string())
            })?;
        validate_batch(&questions).inspect_err(|e| {
            tracing::warn!("Discarding malformed batch for topic={}: {}", request.topic, e);
        })?;
        Ok(questions)
    })
    .await;

    match result {
        Ok(questions) => {
            QUESTION_GENERATION_TOTAL
                .with_label_values(&["generated"])
                .inc();
            let questions = questions
                .into_iter()
                .map(|q| q.with_origin(&request.topic, request.difficulty))
                .collect();
            Ok(QuestionBatch {
                batch_id: Uuid::new_v4().to_string(),
                questions,
                source: BatchSource::Generated,
            })
        }
        Err(e) if policy.fallback_enabled => {
            QUESTION_GENERATION_TOTAL
                .with_label_values(&["fallback"])
                .inc();
            tracing::warn!(
                "Using fallback questions for topic={} after: {}",
                request.topic,
                e
            );
            Ok(fallback_batch(request.count))
        }
        Err(e) => {
            let outcome = if matches!(e, QuizError::MalformedBatch(_)) {
                "malformed"
            } else {
                "failed"
            };
            QUESTION_GENERATION_TOTAL
                .with_label_values(&[outcome])
                .inc();
            Err(e)
        }
    }
}

fn fallback_question(prompt: &str, options: [&str; 4], correct: &str, fact: &str) -> QuizQuestion {
    QuizQuestion {
        prompt: prompt.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_answer: correct.to_string(),
        feedback_on_correct: format!("Correct! {}", fact),
        feedback_on_incorrect: format!("Sorry, that's incorrect. {}", fact),
        topic: "General Knowledge".to_string(),
        difficulty: Some(1),
    }
}

/// Static general-knowledge questions used when generation is unavailable.
pub fn fallback_questions() -> Vec<QuizQuestion> {
    vec![
        fallback_question(
            "What is the capital of France?",
            ["London", "Berlin", "Paris", "Madrid"],
            "Paris",
            "The capital of France is Paris.",
        ),
        fallback_question(
            "Which planet is known as the Red Planet?",
            ["Venus", "Mars", "Jupiter", "Mercury"],
            "Mars",
            "Mars looks red because of iron oxide on its surface.",
        ),
        fallback_question(
            "How many continents are there on Earth?",
            ["5", "6", "7", "8"],
            "7",
            "There are seven continents.",
        ),
        fallback_question(
            "What is the largest ocean on Earth?",
            ["Atlantic", "Indian", "Arctic", "Pacific"],
            "Pacific",
            "The Pacific is the largest and deepest ocean.",
        ),
        fallback_question(
            "Which gas do plants absorb from the atmosphere?",
            ["Oxygen", "Carbon dioxide", "Nitrogen", "Helium"],
            "Carbon dioxide",
            "Plants take in carbon dioxide for photosynthesis.",
        ),
    ]
}

pub fn fallback_batch(count: usize) -> QuestionBatch {
    let questions = fallback_questions()
        .into_iter()
        .take(count.max(1))
        .collect();
    QuestionBatch {
        batch_id: format!("fallback-{}", Uuid::new_v4()),
        questions,
        source: BatchSource::Fallback,
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedQuiz {
    questions: Vec<QuizQuestion>,
}

/// Question source backed by an OpenAI-compatible chat completions API,
/// using a forced function call to get structured output.
pub struct OpenAiQuestionSource {
    http_client: Client,
    config: OpenAiConfig,
}

impl OpenAiQuestionSource {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client for question source")?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn request_body(&self, topic: &str, difficulty: u32, count: usize) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": [{
                "role": "system",
                "content": format!(
                    "Create a concise quiz about {} at difficulty level {} with {} questions. \
                     Each question should have 4 distinct options, one correct answer that is \
                     exactly one of the options, and brief feedback messages.",
                    topic, difficulty, count
                ),
            }],
            "functions": [{
                "name": "createQuiz",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "questions": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "question": { "type": "string" },
                                    "options": { "type": "array", "items": { "type": "string" } },
                                    "correctAnswer": { "type": "string" },
                                    "hostMessageCorrect": { "type": "string" },
                                    "hostMessageIncorrect": { "type": "string" }
                                },
                                "required": [
                                    "question",
                                    "options",
                                    "correctAnswer",
                                    "hostMessageCorrect",
                                    "hostMessageIncorrect"
                                ]
                            }
                        }
                    },
                    "required": ["questions"]
                }
            }],
            "function_call": { "name": "createQuiz" }
        })
    }
}

/// Pulls the `createQuiz` arguments out of a chat completion response.
fn parse_function_arguments(body: &serde_json::Value) -> Result<Vec<QuizQuestion>> {
    let message = &body["choices"][0]["message"];
    let arguments = message["function_call"]["arguments"]
        .as_str()
        .or_else(|| message["tool_calls"][0]["function"]["arguments"].as_str())
        .ok_or_else(|| anyhow!("Response has no createQuiz function call"))?;

    let quiz: GeneratedQuiz =
        serde_json::from_str(arguments).context("Failed to parse createQuiz arguments")?;
    Ok(quiz.questions)
}

#[async_trait]
impl QuestionSource for OpenAiQuestionSource {
    async fn request_batch(
        &self,
        topic: &str,
        difficulty: u32,
        count: usize,
    ) -> Result<Vec<QuizQuestion>> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        tracing::debug!(
            "Calling question generator: {} topic={} difficulty={} count={}",
            url,
            topic,
            difficulty,
            count
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(topic, difficulty, count))
            .send()
            .await
            .context("Failed to call question generator")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Question generator returned error {}: {}",
                status,
                error_text
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to decode question generator response")?;
        let questions = parse_function_arguments(&body)?;

        tracing::info!(
            "Generated {} questions for topic={} difficulty={}",
            questions.len(),
            topic,
            difficulty
        );
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::sample_question;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<Vec<Result<Vec<QuizQuestion>>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Vec<QuizQuestion>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QuestionSource for Scripted {
        async fn request_batch(&self, _: &str, _: u32, _: usize) -> Result<Vec<QuizQuestion>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn request() -> PendingRequest {
        PendingRequest {
            request_id: "r-1".to_string(),
            topic: "Rust".to_string(),
            difficulty: 2,
            count: 2,
            advance: None,
        }
    }

    fn policy(attempts: usize, fallback_enabled: bool) -> FetchPolicy {
        FetchPolicy {
            attempts,
            backoff: Duration::from_millis(1),
            fallback_enabled,
        }
    }

    fn bad_question() -> QuizQuestion {
        let mut question = sample_question("Broken", "X");
        question.correct_answer = "not an option".to_string();
        question
    }

    #[test]
    fn empty_batch_is_malformed() {
        assert!(matches!(
            validate_batch(&[]),
            Err(QuizError::MalformedBatch(_))
        ));
    }

    #[test]
    fn one_bad_question_rejects_whole_batch() {
        let questions = vec![sample_question("Ok", "A"), bad_question()];
        assert!(matches!(
            validate_batch(&questions),
            Err(QuizError::MalformedBatch(_))
        ));
    }

    #[test]
    fn fallback_set_is_valid() {
        let batch = fallback_batch(3);
        assert_eq!(batch.questions.len(), 3);
        assert_eq!(batch.source, BatchSource::Fallback);
        assert!(validate_batch(&batch.questions).is_ok());
        assert_eq!(fallback_batch(50).questions.len(), fallback_questions().len());
    }

    #[test]
    fn parses_function_call_arguments() {
        let arguments = json!({
            "questions": [{
                "question": "2 + 2?",
                "options": ["1", "2", "3", "4"],
                "correctAnswer": "4",
                "hostMessageCorrect": "Yes",
                "hostMessageIncorrect": "No"
            }]
        })
        .to_string();
        let body = json!({
            "choices": [{ "message": { "function_call": { "name": "createQuiz", "arguments": arguments } } }]
        });

        let questions = parse_function_arguments(&body).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "4");
    }

    #[test]
    fn missing_function_call_is_an_error() {
        let body = json!({ "choices": [{ "message": { "content": "hello" } }] });
        assert!(parse_function_arguments(&body).is_err());
    }

    #[tokio::test]
    async fn tags_generated_questions_with_request_origin() {
        let source = Scripted::new(vec![Ok(vec![sample_question("Q", "A")])]);

        let batch = fetch_batch(&source, &request(), &policy(1, false))
            .await
            .unwrap();

        assert_eq!(batch.source, BatchSource::Generated);
        assert_eq!(batch.questions[0].difficulty, Some(2));
        assert_eq!(batch.questions[0].topic, "General");
    }

    #[tokio::test]
    async fn retries_after_malformed_response() {
        let source = Scripted::new(vec![
            Ok(vec![bad_question()]),
            Ok(vec![sample_question("Q", "A")]),
        ]);

        let batch = fetch_batch(&source, &request(), &policy(2, false))
            .await
            .unwrap();

        assert_eq!(batch.questions.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let source = Scripted::new(vec![
            Err(anyhow!("timeout")),
            Ok(vec![bad_question()]),
        ]);

        let err = fetch_batch(&source, &request(), &policy(2, false))
            .await
            .unwrap_err();

        assert!(matches!(err, QuizError::MalformedBatch(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn generation_failure_without_fallback() {
        let source = Scripted::new(vec![Err(anyhow!("boom"))]);

        let err = fetch_batch(&source, &request(), &policy(1, false))
            .await
            .unwrap_err();

        assert!(matches!(err, QuizError::GenerationFailure(_)));
    }

    #[tokio::test]
    async fn fallback_replaces_failed_generation_when_enabled() {
        let source = Scripted::new(vec![Err(anyhow!("boom"))]);

        let batch = fetch_batch(&source, &request(), &policy(1, true))
            .await
            .unwrap();

        assert_eq!(batch.source, BatchSource::Fallback);
        assert_eq!(batch.questions.len(), 2);
    }
}

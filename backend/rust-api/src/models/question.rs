use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

pub const OPTIONS_PER_QUESTION: usize = 4;

/// A single multiple-choice question as produced by the question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_answer_options"))]
pub struct QuizQuestion {
    #[serde(alias = "question")]
    #[validate(length(min = 1, message = "Question prompt must not be empty"))]
    pub prompt: String,

    #[validate(length(equal = 4, message = "Question must have exactly 4 options"))]
    pub options: Vec<String>,

    pub correct_answer: String,

    #[serde(alias = "hostMessageCorrect", default)]
    pub feedback_on_correct: String,

    #[serde(alias = "hostMessageIncorrect", default)]
    pub feedback_on_incorrect: String,

    #[serde(default)]
    pub topic: String,

    /// Difficulty reported by the generator; `None` when it did not say.
    #[validate(range(min = 1, message = "Difficulty must be at least 1"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u32>,
}

fn validate_answer_options(question: &QuizQuestion) -> Result<(), ValidationError> {
    let distinct: HashSet<&str> = question.options.iter().map(String::as_str).collect();
    if distinct.len() != question.options.len() {
        return Err(ValidationError::new("duplicate_options")
            .with_message("Question options must be unique".into()));
    }

    if !question.options.contains(&question.correct_answer) {
        return Err(ValidationError::new("correct_answer_not_in_options")
            .with_message("Correct answer must be one of the options".into()));
    }

    Ok(())
}

impl QuizQuestion {
    pub fn is_correct(&self, choice: &str) -> bool {
        self.correct_answer == choice
    }

    pub fn feedback_for(&self, correct: bool) -> &str {
        if correct {
            &self.feedback_on_correct
        } else {
            &self.feedback_on_incorrect
        }
    }

    /// Fills in the requested topic and difficulty where the generator left
    /// them out. Values the generator did supply are kept.
    pub fn with_origin(mut self, topic: &str, difficulty: u32) -> Self {
        if self.topic.is_empty() {
            self.topic = topic.to_string();
        }
        self.difficulty.get_or_insert(difficulty);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBatch {
    pub batch_id: String,
    pub questions: Vec<QuizQuestion>,
    pub source: BatchSource,
}

/// Question as shown to the player: the answer is withheld until revealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

impl QuestionView {
    pub fn from_question(question: &QuizQuestion, reveal: bool) -> Self {
        Self {
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            topic: question.topic.clone(),
            difficulty: question.difficulty,
            correct_answer: reveal.then(|| question.correct_answer.clone()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_question(prompt: &str, correct: &str) -> QuizQuestion {
    let mut options = vec![correct.to_string()];
    options.extend((1..OPTIONS_PER_QUESTION).map(|i| format!("{} distractor {}", prompt, i)));
    QuizQuestion {
        prompt: prompt.to_string(),
        options,
        correct_answer: correct.to_string(),
        feedback_on_correct: "Correct!".to_string(),
        feedback_on_incorrect: format!("The answer was {}", correct),
        topic: "General".to_string(),
        difficulty: None,
    }
}

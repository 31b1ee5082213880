use serde::Deserialize;

use crate::models::SessionState;

/// What happens to score, experience and level when the topic changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPolicy {
    /// Score, experience and level carry over across repeats and topics.
    #[default]
    Persist,
    /// Moving to the next topic starts score, experience and level from scratch.
    ResetPerTopic,
}

impl ProgressPolicy {
    pub fn resets_on_advance(&self) -> bool {
        *self == ProgressPolicy::ResetPerTopic
    }
}

/// Back to score 0, experience 0, level 1.
pub fn reset_progress(state: &mut SessionState) {
    state.score = 0;
    state.experience = 0;
    state.level = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicStep {
    pub topic_index: usize,
    pub difficulty: u32,
    pub wrapped: bool,
}

/// Fixed ordered list of topics the quiz cycles through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRotation {
    topics: Vec<String>,
}

impl TopicRotation {
    pub fn new(topics: Vec<String>) -> anyhow::Result<Self> {
        let topics: Vec<String> = topics
            .into_iter()
            .map(|topic| topic.trim().to_string())
            .filter(|topic| !topic.is_empty())
            .collect();
        if topics.is_empty() {
            anyhow::bail!("Topic rotation must contain at least one topic");
        }
        Ok(Self { topics })
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topic(&self, index: usize) -> &str {
        &self.topics[index % self.topics.len()]
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Next position in the rotation; difficulty rises once per full pass.
    pub fn step(&self, topic_index: usize, difficulty: u32) -> TopicStep {
        let next = (topic_index + 1) % self.topics.len();
        let wrapped = next == 0;
        TopicStep {
            topic_index: next,
            difficulty: if wrapped { difficulty + 1 } else { difficulty },
            wrapped,
        }
    }
}

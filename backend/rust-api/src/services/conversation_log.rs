use crate::models::{ConversationEntry, Role};

/// Append-only message history for one quiz conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: ConversationEntry) -> &ConversationEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> ConversationEntry {
        self.append(ConversationEntry::new(role, content)).clone()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// The last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> &[ConversationEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_append_order() {
        let mut log = ConversationLog::new();
        log.append_message(Role::User, "first");
        log.append_message(Role::Assistant, "second");
        log.append_message(Role::User, "third");

        let contents: Vec<&str> = log.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert_eq!(log.entries()[1].role, Role::Assistant);
    }

    #[test]
    fn recent_returns_tail() {
        let mut log = ConversationLog::new();
        for i in 0..5 {
            log.append_message(Role::User, format!("m{}", i));
        }
        let tail: Vec<&str> = log.recent(2).iter().map(|e| e.content.as_str()).collect();
        assert_eq!(tail, vec!["m3", "m4"]);
        assert_eq!(log.recent(10).len(), 5);
    }
}

//! Per-run conversation history
//!
//! The first message is always the system instruction; after that the history
//! only grows. A conversation lives for exactly one run and is never written
//! to disk.

use crate::ollama::ChatMessage;

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Seed a conversation with the system instruction and the user request
    pub fn new(system_prompt: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(request)],
        }
    }

    /// Record the raw model reply, malformed or not
    pub fn push_assistant(&mut self, reply: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(reply));
    }

    /// Record corrective feedback built from one failed execution
    pub fn push_feedback(&mut self, stderr: &str) {
        self.messages.push(ChatMessage::user(feedback_for(stderr)));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}

/// Fix request for the next turn, built strictly from the latest stderr
pub fn feedback_for(stderr: &str) -> String {
    format!("Your code failed with this error:\n{}\nPlease fix it.", stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::Role;

    #[test]
    fn test_seeded_with_system_then_user() {
        let conversation = Conversation::new("sys", "draw a circle");
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[0], ChatMessage::system("sys"));
        assert_eq!(conversation.messages()[1], ChatMessage::user("draw a circle"));
    }

    #[test]
    fn test_feedback_contains_exact_stderr() {
        let mut conversation = Conversation::new("sys", "req");
        conversation.push_assistant("{}");
        conversation.push_feedback("Traceback: boom\n");

        let messages = conversation.messages();
        assert_eq!(messages[2].role, Role::Assistant);
        let last = &messages[3];
        assert_eq!(last.role, Role::User);
        assert!(last.content.contains("Traceback: boom\n"));
        assert!(last.content.ends_with("Please fix it."));
    }

    #[test]
    fn test_system_message_stays_first() {
        let mut conversation = Conversation::new("sys", "req");
        for i in 0..3 {
            conversation.push_assistant(format!("reply {}", i));
            conversation.push_feedback("err");
        }
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.messages().len(), 8);
    }
}

//! Conversation context for the generation stage.
//!
//! The generation service is stateless, so every request carries a compact
//! transcript of the most recent turns taken from the session history:
//!
//! ```text
//! user: Как дела?
//! assistant: Отлично, спасибо!
//! ```

use crate::session::{Message, SessionHandle};

/// Longest single message kept in the context, in characters.
const MAX_MESSAGE_CHARS: usize = 500;

pub struct ConversationContext {
    max_messages: usize,
}

impl ConversationContext {
    pub fn new(max_messages: usize) -> Self {
        Self { max_messages }
    }

    /// Context string for the next generation request. Empty when there is
    /// no history yet or the window is zero.
    pub fn build(&self, session: &SessionHandle) -> String {
        if self.max_messages == 0 {
            return String::new();
        }
        render(&session.recent_history(self.max_messages))
    }
}

/// One `role: text` line per message, oldest first.
pub fn render(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let text = m.text().trim();
            match text.char_indices().nth(MAX_MESSAGE_CHARS) {
                Some((cut, _)) => format!("{}: {}…", m.role().label(), &text[..cut]),
                None => format!("{}: {}", m.role().label(), text),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_history_gives_empty_context() {
        let session = SessionHandle::new();
        assert_eq!(ConversationContext::new(6).build(&session), "");
    }

    #[test]
    fn keeps_only_the_most_recent_messages() {
        let session = SessionHandle::new();
        let now = Utc::now();
        session.append(Message::user("first", now));
        session.append(Message::assistant("reply one", None, now));
        session.append(Message::user("second", now));
        session.append(Message::assistant("reply two", None, now));

        let ctx = ConversationContext::new(2).build(&session);
        assert_eq!(ctx, "user: second\nassistant: reply two");
        assert_eq!(ConversationContext::new(0).build(&session), "");
    }

    #[test]
    fn long_messages_are_truncated_on_char_boundaries() {
        let long = "я".repeat(MAX_MESSAGE_CHARS + 10);
        let rendered = render(&[Message::user(long, Utc::now())]);
        assert!(rendered.ends_with('…'));
        assert_eq!(
            rendered.chars().count(),
            "user: ".len() + MAX_MESSAGE_CHARS + 1
        );
    }
}

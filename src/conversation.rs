//! In-memory conversation state: the ordered turn list and the flag that
//! marks a reply currently being assembled into the trailing placeholder.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who produced a turn. Serialized lowercase to match the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Short label used in transcript headers.
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "you",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in the conversation. Only `role` and `content` go over the
/// wire; the timestamp exists for transcript display.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing)]
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// The ordered turn sequence plus the in-flight flag.
///
/// The sequence is append-only except for the last assistant turn's content,
/// which is mutated in place while a reply streams in. The first turn is
/// always the system turn; `reset` replaces the whole sequence with a fresh
/// single-element one.
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
    streaming: bool,
    system_prompt: String,
}

impl Conversation {
    /// A fresh conversation seeded with the system turn.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            turns: vec![Turn::new(Role::System, system_prompt.clone())],
            streaming: false,
            system_prompt,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// True while a request is filling the trailing placeholder turn.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// The turn currently receiving fragments, if any.
    pub fn streaming_turn(&self) -> Option<&Turn> {
        if self.streaming { self.turns.last() } else { None }
    }

    /// Append a turn. Empty or whitespace-only user input is a no-op (not an
    /// error); returns whether a turn was actually appended.
    pub fn append_turn(&mut self, role: Role, content: impl Into<String>) -> bool {
        let content = content.into();
        if role == Role::User && content.trim().is_empty() {
            return false;
        }
        self.turns.push(Turn::new(role, content));
        true
    }

    /// Replace the sequence with a single fresh system turn and clear the
    /// in-flight flag. Calling this twice in a row is equivalent to once.
    pub fn reset(&mut self) {
        self.turns = vec![Turn::new(Role::System, self.system_prompt.clone())];
        self.streaming = false;
    }

    /// Append the empty assistant placeholder and raise the in-flight flag.
    /// Must run before the first fragment of a reply arrives.
    pub fn begin_streaming_placeholder(&mut self) {
        assert!(
            !self.streaming,
            "placeholder begun while a reply is already in flight"
        );
        self.turns.push(Turn::new(Role::Assistant, ""));
        self.streaming = true;
    }

    /// Concatenate `text` onto the placeholder's content.
    ///
    /// Calling this without an in-flight placeholder is a contract violation
    /// and panics; it is not a recoverable error.
    pub fn append_fragment(&mut self, text: &str) {
        let turn = self.expect_placeholder("fragment applied");
        turn.content.push_str(text);
    }

    /// Overwrite the placeholder's content with the complete reply and clear
    /// the in-flight flag. Whole-reply success path.
    pub fn complete_reply(&mut self, text: impl Into<String>) {
        let turn = self.expect_placeholder("reply completed");
        turn.content = text.into();
        self.streaming = false;
    }

    /// Drop the placeholder turn and clear the in-flight flag. Failure path
    /// for requests that never produced content.
    pub fn abandon_placeholder(&mut self) {
        self.expect_placeholder("placeholder abandoned");
        self.turns.pop();
        self.streaming = false;
    }

    /// Clear the in-flight flag, leaving whatever content the placeholder
    /// accumulated.
    pub fn end_streaming(&mut self) {
        self.streaming = false;
    }

    fn expect_placeholder(&mut self, action: &str) -> &mut Turn {
        assert!(self.streaming, "{action} with no reply in flight");
        let turn = self
            .turns
            .last_mut()
            .expect("conversation always holds the system turn");
        assert!(
            turn.role == Role::Assistant,
            "{action} but the last turn is not an assistant turn"
        );
        turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "You are a helpful assistant.";

    fn convo() -> Conversation {
        Conversation::new(PROMPT)
    }

    #[test]
    fn starts_with_single_system_turn() {
        let c = convo();
        assert_eq!(c.turns().len(), 1);
        assert_eq!(c.turns()[0].role, Role::System);
        assert_eq!(c.turns()[0].content, PROMPT);
        assert!(!c.is_streaming());
    }

    #[test]
    fn system_turn_stays_first_across_sends_and_clears() {
        let mut c = convo();
        for i in 0..3 {
            c.append_turn(Role::User, format!("message {i}"));
            c.begin_streaming_placeholder();
            c.append_fragment("reply");
            c.end_streaming();
        }
        assert_eq!(c.turns()[0].role, Role::System);
        let system_count = c
            .turns()
            .iter()
            .filter(|t| t.role == Role::System)
            .count();
        assert_eq!(system_count, 1);

        c.reset();
        c.append_turn(Role::User, "again");
        assert_eq!(c.turns()[0].role, Role::System);
        assert_eq!(c.turns().len(), 2);
    }

    #[test]
    fn whitespace_only_user_input_is_a_no_op() {
        let mut c = convo();
        assert!(!c.append_turn(Role::User, ""));
        assert!(!c.append_turn(Role::User, "   \n\t "));
        assert_eq!(c.turns().len(), 1);
    }

    #[test]
    fn fragments_concatenate_in_order() {
        let mut c = convo();
        c.append_turn(Role::User, "hi");
        c.begin_streaming_placeholder();
        for piece in ["a", "b", "c"] {
            c.append_fragment(piece);
        }
        assert_eq!(c.turns().last().unwrap().content, "abc");
        assert!(c.is_streaming());
        c.end_streaming();
        assert!(!c.is_streaming());
        assert_eq!(c.turns().last().unwrap().content, "abc");
    }

    #[test]
    fn complete_reply_overwrites_the_placeholder() {
        let mut c = convo();
        c.append_turn(Role::User, "2+2?");
        c.begin_streaming_placeholder();
        c.complete_reply("4");
        assert!(!c.is_streaming());
        let assistants: Vec<_> = c
            .turns()
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].content, "4");
    }

    #[test]
    fn abandon_placeholder_leaves_only_the_user_turn() {
        let mut c = convo();
        c.append_turn(Role::User, "hello");
        c.begin_streaming_placeholder();
        c.abandon_placeholder();
        assert!(!c.is_streaming());
        assert_eq!(c.turns().len(), 2);
        assert_eq!(c.turns().last().unwrap().role, Role::User);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut c = convo();
        c.append_turn(Role::User, "one");
        c.begin_streaming_placeholder();
        c.append_fragment("two");
        c.reset();
        let first = format!("{:?}", roles_and_contents(&c));
        c.reset();
        let second = format!("{:?}", roles_and_contents(&c));
        assert_eq!(first, second);
        assert_eq!(c.turns().len(), 1);
        assert!(!c.is_streaming());
    }

    #[test]
    fn streaming_turn_tracks_the_placeholder() {
        let mut c = convo();
        assert!(c.streaming_turn().is_none());
        c.append_turn(Role::User, "hi");
        c.begin_streaming_placeholder();
        c.append_fragment("part");
        assert_eq!(c.streaming_turn().unwrap().content, "part");
        c.end_streaming();
        assert!(c.streaming_turn().is_none());
    }

    #[test]
    #[should_panic(expected = "no reply in flight")]
    fn fragment_without_placeholder_is_a_contract_violation() {
        let mut c = convo();
        c.append_turn(Role::User, "hi");
        c.append_fragment("oops");
    }

    #[test]
    fn turn_serializes_to_role_and_content_only() {
        let turn = Turn::new(Role::Assistant, "hello");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"role": "assistant", "content": "hello"})
        );
    }

    fn roles_and_contents(c: &Conversation) -> Vec<(Role, String)> {
        c.turns()
            .iter()
            .map(|t| (t.role, t.content.clone()))
            .collect()
    }
}

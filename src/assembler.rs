//! Drives one exchange at a time against the assistant endpoint.
//!
//! Both modes follow the same shape: append the user turn, snapshot the
//! payload, append an empty assistant placeholder, then settle the
//! placeholder when the network answers. Whole replies overwrite it in
//! one step, streamed replies grow it fragment by fragment. On failure
//! the placeholder is dropped unless fragments already landed, in which
//! case the partial reply stays.

use crate::client::{ChatClient, StreamEvent};
use crate::conversation::{Conversation, Role};
use crate::error::ChatError;
use crate::routing::{KeywordRouter, RoutePolicy, SendMode};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// What the assembler is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    /// Whole-reply request out, nothing displayable yet.
    AwaitingReply,
    /// Streamed request out, fragments may be arriving.
    Streaming,
}

/// Result of asking the assembler to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Started(SendMode),
    /// Whitespace-only input, nothing happened.
    IgnoredEmpty,
    /// A reply is already in flight, input stays where it was.
    Busy,
}

enum InFlight {
    Whole(oneshot::Receiver<Result<String, ChatError>>),
    Streamed(mpsc::Receiver<StreamEvent>),
}

pub struct Assembler {
    client: ChatClient,
    policy: Box<dyn RoutePolicy>,
    in_flight: Option<InFlight>,
    fragments_applied: bool,
    last_error: Option<String>,
}

impl Assembler {
    pub fn new(client: ChatClient) -> Self {
        Self::with_policy(client, Box::new(KeywordRouter))
    }

    pub fn with_policy(client: ChatClient, policy: Box<dyn RoutePolicy>) -> Self {
        Self {
            client,
            policy,
            in_flight: None,
            fragments_applied: false,
            last_error: None,
        }
    }

    pub fn phase(&self) -> SendPhase {
        match self.in_flight {
            None => SendPhase::Idle,
            Some(InFlight::Whole(_)) => SendPhase::AwaitingReply,
            Some(InFlight::Streamed(_)) => SendPhase::Streaming,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Error from the most recent failed exchange, until dismissed or
    /// replaced by the next send.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Start an exchange for `text`.
    ///
    /// The route comes from `forced` when the user pinned a mode,
    /// otherwise from the routing policy. On [`SendOutcome::Started`] the
    /// conversation has gained the user turn and the reply placeholder.
    pub fn begin_send(
        &mut self,
        conversation: &mut Conversation,
        text: &str,
        forced: Option<SendMode>,
    ) -> SendOutcome {
        if self.is_busy() || conversation.is_streaming() {
            return SendOutcome::Busy;
        }
        if !conversation.append_turn(Role::User, text) {
            return SendOutcome::IgnoredEmpty;
        }

        let mode = forced.unwrap_or_else(|| self.policy.classify(text));
        // Snapshot before the placeholder so it never rides the wire.
        let payload = conversation.turns().to_vec();
        conversation.begin_streaming_placeholder();

        self.last_error = None;
        self.fragments_applied = false;
        self.in_flight = Some(match mode {
            SendMode::Whole => InFlight::Whole(self.client.request_whole(&payload)),
            SendMode::Streaming => InFlight::Streamed(self.client.stream_reply(&payload)),
        });
        SendOutcome::Started(mode)
    }

    /// Apply everything the in-flight exchange has produced since the
    /// last call. Returns true when the conversation changed.
    pub fn pump(&mut self, conversation: &mut Conversation) -> bool {
        let Some(flight) = self.in_flight.take() else {
            return false;
        };
        match flight {
            InFlight::Whole(mut rx) => match rx.try_recv() {
                Ok(Ok(reply)) => {
                    conversation.complete_reply(reply);
                    true
                }
                Ok(Err(err)) => {
                    self.fail(conversation, err.to_string());
                    true
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.in_flight = Some(InFlight::Whole(rx));
                    false
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.fail(conversation, "request ended without a reply".to_string());
                    true
                }
            },
            InFlight::Streamed(mut rx) => {
                let mut changed = false;
                loop {
                    match rx.try_recv() {
                        Ok(StreamEvent::Fragment(fragment)) => {
                            conversation.append_fragment(&fragment);
                            self.fragments_applied = true;
                            changed = true;
                        }
                        Ok(StreamEvent::Closed) => {
                            conversation.end_streaming();
                            changed = true;
                            break;
                        }
                        Ok(StreamEvent::Failed(err)) => {
                            self.fail(conversation, err.to_string());
                            changed = true;
                            break;
                        }
                        Err(mpsc::error::TryRecvError::Empty) => {
                            self.in_flight = Some(InFlight::Streamed(rx));
                            break;
                        }
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            self.fail(conversation, "stream ended unexpectedly".to_string());
                            changed = true;
                            break;
                        }
                    }
                }
                changed
            }
        }
    }

    /// Settle a failed exchange. A placeholder that never received a
    /// fragment disappears; a partial streamed reply stays.
    fn fail(&mut self, conversation: &mut Conversation, message: String) {
        warn!(error = %message, "exchange failed");
        if !self.fragments_applied {
            conversation.abandon_placeholder();
        }
        conversation.end_streaming();
        self.last_error = Some(message);
    }

    #[cfg(test)]
    fn inject_whole(&mut self, rx: oneshot::Receiver<Result<String, ChatError>>) {
        self.fragments_applied = false;
        self.in_flight = Some(InFlight::Whole(rx));
    }

    #[cfg(test)]
    fn inject_stream(&mut self, rx: mpsc::Receiver<StreamEvent>) {
        self.fragments_applied = false;
        self.in_flight = Some(InFlight::Streamed(rx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::conversation::Role;

    fn test_client() -> ChatClient {
        let config = Config {
            endpoint: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            paragraph_breaks: false,
            system_prompt: "test".to_string(),
        };
        ChatClient::new(&config).unwrap()
    }

    fn assembler() -> Assembler {
        Assembler::new(test_client())
    }

    fn conversation() -> Conversation {
        Conversation::new("You are a helpful assistant.")
    }

    /// Puts the conversation into the same shape `begin_send` leaves it
    /// in: user turn appended, placeholder pending.
    fn with_pending_reply(conversation: &mut Conversation) {
        conversation.append_turn(Role::User, "hi");
        conversation.begin_streaming_placeholder();
    }

    #[tokio::test]
    async fn whitespace_input_is_ignored() {
        let mut asm = assembler();
        let mut conv = conversation();
        assert_eq!(
            asm.begin_send(&mut conv, "   \n\t", None),
            SendOutcome::IgnoredEmpty
        );
        assert_eq!(conv.turns().len(), 1);
        assert!(!asm.is_busy());
    }

    #[tokio::test]
    async fn second_send_is_rejected_while_busy() {
        let mut asm = assembler();
        let mut conv = conversation();
        assert_eq!(
            asm.begin_send(&mut conv, "first", None),
            SendOutcome::Started(SendMode::Streaming)
        );
        let turns_after_first = conv.turns().len();
        assert_eq!(asm.begin_send(&mut conv, "second", None), SendOutcome::Busy);
        assert_eq!(conv.turns().len(), turns_after_first);
    }

    #[tokio::test]
    async fn routing_picks_whole_for_calculations_and_honors_override() {
        let mut asm = assembler();
        let mut conv = conversation();
        assert_eq!(
            asm.begin_send(&mut conv, "calculate 17 * 4", None),
            SendOutcome::Started(SendMode::Whole)
        );

        let mut asm = assembler();
        let mut conv = conversation();
        assert_eq!(
            asm.begin_send(&mut conv, "tell me a story", Some(SendMode::Whole)),
            SendOutcome::Started(SendMode::Whole)
        );
    }

    #[tokio::test]
    async fn send_appends_user_turn_and_placeholder() {
        let mut asm = assembler();
        let mut conv = conversation();
        asm.begin_send(&mut conv, "hello there", None);
        let turns = conv.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].content, "hello there");
        assert_eq!(turns[2].role, Role::Assistant);
        assert_eq!(turns[2].content, "");
        assert!(conv.is_streaming());
    }

    #[tokio::test]
    async fn pump_is_a_no_op_when_idle() {
        let mut asm = assembler();
        let mut conv = conversation();
        assert!(!asm.pump(&mut conv));
    }

    #[tokio::test]
    async fn whole_reply_overwrites_the_placeholder() {
        let mut asm = assembler();
        let mut conv = conversation();
        with_pending_reply(&mut conv);

        let (tx, rx) = oneshot::channel();
        asm.inject_whole(rx);
        assert!(!asm.pump(&mut conv));

        tx.send(Ok("the answer".to_string())).unwrap();
        assert!(asm.pump(&mut conv));
        assert_eq!(conv.turns().last().unwrap().content, "the answer");
        assert!(!conv.is_streaming());
        assert!(!asm.is_busy());
        assert!(asm.last_error().is_none());
    }

    #[tokio::test]
    async fn whole_failure_removes_placeholder_and_records_error() {
        let mut asm = assembler();
        let mut conv = conversation();
        with_pending_reply(&mut conv);

        let (tx, rx) = oneshot::channel();
        asm.inject_whole(rx);
        tx.send(Err(ChatError::malformed("no `response` key"))).unwrap();

        assert!(asm.pump(&mut conv));
        assert_eq!(conv.turns().len(), 2);
        assert_eq!(conv.turns().last().unwrap().role, Role::User);
        assert!(!conv.is_streaming());
        assert!(asm.last_error().unwrap().contains("no `response` key"));
    }

    #[tokio::test]
    async fn fragments_accumulate_then_close_finishes_the_turn() {
        let mut asm = assembler();
        let mut conv = conversation();
        with_pending_reply(&mut conv);

        let (tx, rx) = mpsc::channel(8);
        asm.inject_stream(rx);
        tx.send(StreamEvent::Fragment("Once".to_string())).await.unwrap();
        tx.send(StreamEvent::Fragment(" upon".to_string())).await.unwrap();

        assert!(asm.pump(&mut conv));
        assert_eq!(conv.streaming_turn().unwrap().content, "Once upon");
        assert!(asm.is_busy());

        tx.send(StreamEvent::Closed).await.unwrap();
        assert!(asm.pump(&mut conv));
        assert!(!conv.is_streaming());
        assert!(!asm.is_busy());
        assert_eq!(conv.turns().last().unwrap().content, "Once upon");
    }

    #[tokio::test]
    async fn stream_failure_after_fragments_keeps_the_partial_reply() {
        let mut asm = assembler();
        let mut conv = conversation();
        with_pending_reply(&mut conv);

        let (tx, rx) = mpsc::channel(8);
        asm.inject_stream(rx);
        tx.send(StreamEvent::Fragment("partial".to_string())).await.unwrap();
        tx.send(StreamEvent::Failed(ChatError::malformed("connection reset")))
            .await
            .unwrap();

        assert!(asm.pump(&mut conv));
        assert_eq!(conv.turns().last().unwrap().content, "partial");
        assert_eq!(conv.turns().len(), 3);
        assert!(!conv.is_streaming());
        assert!(asm.last_error().is_some());
    }

    #[tokio::test]
    async fn stream_failure_before_any_fragment_removes_placeholder() {
        let mut asm = assembler();
        let mut conv = conversation();
        with_pending_reply(&mut conv);

        let (tx, rx) = mpsc::channel(8);
        asm.inject_stream(rx);
        tx.send(StreamEvent::Failed(ChatError::malformed("503")))
            .await
            .unwrap();

        assert!(asm.pump(&mut conv));
        assert_eq!(conv.turns().len(), 2);
        assert_eq!(conv.turns().last().unwrap().role, Role::User);
        assert!(!conv.is_streaming());
    }

    #[tokio::test]
    async fn next_send_clears_the_previous_error() {
        let mut asm = assembler();
        let mut conv = conversation();
        with_pending_reply(&mut conv);

        let (tx, rx) = oneshot::channel();
        asm.inject_whole(rx);
        tx.send(Err(ChatError::malformed("boom"))).unwrap();
        asm.pump(&mut conv);
        assert!(asm.last_error().is_some());

        asm.begin_send(&mut conv, "try again", None);
        assert!(asm.last_error().is_none());
    }
}

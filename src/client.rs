//! HTTP transport for the assistant endpoint.
//!
//! Two routes share one request shape: `POST <base>/chat` answers with a
//! single JSON body, `POST <base>/chat_stream` answers with chunked text.
//! Both run on spawned tasks and hand results back through channels, so
//! the caller never blocks on the network.

use crate::config::Config;
use crate::conversation::Turn;
use crate::error::ChatError;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const STREAM_CHANNEL_CAPACITY: usize = 100;

/// One event on a streamed reply channel.
#[derive(Debug)]
pub enum StreamEvent {
    /// A displayable piece of the reply, in arrival order.
    Fragment(String),
    /// The endpoint closed the stream after the final fragment.
    Closed,
    /// The exchange failed. Fragments already delivered remain valid.
    Failed(ChatError),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Turn],
}

#[derive(Deserialize)]
struct ChatReply {
    response: String,
}

/// Client for one configured assistant endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base: String,
    paragraph_breaks: bool,
}

impl ChatClient {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base: config.endpoint.clone(),
            paragraph_breaks: config.paragraph_breaks,
        })
    }

    /// Request the whole reply in one exchange.
    ///
    /// The receiver resolves exactly once, with the reply text or the
    /// error to display.
    pub fn request_whole(&self, turns: &[Turn]) -> oneshot::Receiver<Result<String, ChatError>> {
        debug!(turns = turns.len(), "requesting whole reply");
        let (tx, rx) = oneshot::channel();
        let request = self
            .http
            .post(self.url("chat"))
            .json(&ChatRequest { messages: turns });
        tokio::spawn(async move {
            let _ = tx.send(fetch_whole(request).await);
        });
        rx
    }

    /// Request a streamed reply.
    ///
    /// The receiver yields [`StreamEvent::Fragment`]s as lines arrive,
    /// then exactly one [`StreamEvent::Closed`] or [`StreamEvent::Failed`].
    pub fn stream_reply(&self, turns: &[Turn]) -> mpsc::Receiver<StreamEvent> {
        debug!(turns = turns.len(), "requesting streamed reply");
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let request = self
            .http
            .post(self.url("chat_stream"))
            .json(&ChatRequest { messages: turns });
        let paragraph_breaks = self.paragraph_breaks;
        tokio::spawn(async move {
            if let Err(err) = run_stream(request, paragraph_breaks, &tx).await {
                let _ = tx.send(StreamEvent::Failed(err)).await;
            }
        });
        rx
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{route}", self.base)
    }
}

async fn fetch_whole(request: reqwest::RequestBuilder) -> Result<String, ChatError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::bad_status(status, body));
    }
    let body = response.text().await?;
    parse_reply(&body)
}

fn parse_reply(body: &str) -> Result<String, ChatError> {
    let reply: ChatReply = serde_json::from_str(body).map_err(|e| {
        ChatError::malformed(format!("expected a JSON object with a `response` string: {e}"))
    })?;
    Ok(reply.response)
}

/// Reads the chunked body, emitting one fragment per non-empty line.
/// Returns Ok(()) when the channel receiver has gone away.
async fn run_stream(
    request: reqwest::RequestBuilder,
    paragraph_breaks: bool,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), ChatError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::bad_status(status, body));
    }

    let mut framer = LineFramer::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for line in framer.push(&chunk) {
            if !emit(tx, &line, paragraph_breaks).await {
                return Ok(());
            }
        }
    }
    // Data after the last newline still belongs to the reply.
    if !emit(tx, &framer.finish(), paragraph_breaks).await {
        return Ok(());
    }
    let _ = tx.send(StreamEvent::Closed).await;
    Ok(())
}

/// Sends one line as a fragment, skipping blanks. Returns false once the
/// receiver is dropped.
async fn emit(tx: &mpsc::Sender<StreamEvent>, line: &str, paragraph_breaks: bool) -> bool {
    if line.is_empty() {
        return true;
    }
    let fragment = if paragraph_breaks {
        format!("{line}\n\n")
    } else {
        line.to_string()
    };
    tx.send(StreamEvent::Fragment(fragment)).await.is_ok()
}

/// Reassembles newline-delimited lines from arbitrarily split transport
/// chunks. Splitting on the byte keeps multi-byte characters intact even
/// when a chunk boundary lands inside one.
struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed one chunk, returning every line it completes.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever arrived after the final newline.
    fn finish(self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_the_wire_contract() {
        let turns = vec![
            Turn::new(crate::conversation::Role::System, "be brief"),
            Turn::new(crate::conversation::Role::User, "hi"),
        ];
        let value = serde_json::to_value(ChatRequest { messages: &turns }).unwrap();
        assert_eq!(
            value,
            json!({
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                ]
            })
        );
    }

    #[test]
    fn reply_parsing_accepts_extra_keys() {
        assert_eq!(
            parse_reply(r#"{"response": "hello", "model": "x"}"#).unwrap(),
            "hello"
        );
    }

    #[test]
    fn reply_parsing_rejects_missing_or_mistyped_response() {
        assert!(matches!(
            parse_reply(r#"{"reply": "hello"}"#),
            Err(ChatError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"response": 42}"#),
            Err(ChatError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_reply("not json"),
            Err(ChatError::MalformedBody(_))
        ));
    }

    #[test]
    fn framer_splits_complete_lines() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"hello\nworld\n"), vec!["hello", "world"]);
        assert_eq!(framer.finish(), "");
    }

    #[test]
    fn framer_holds_partial_lines_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"He").is_empty());
        assert_eq!(framer.push(b"llo\nwor"), vec!["Hello"]);
        assert_eq!(framer.finish(), "wor");
    }

    #[test]
    fn framer_strips_carriage_returns() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"line one\r\nline two\n"), vec!["line one", "line two"]);
    }

    #[test]
    fn framer_survives_chunk_boundaries_inside_characters() {
        let bytes = "héllo\n".as_bytes();
        let mut framer = LineFramer::new();
        assert!(framer.push(&bytes[..2]).is_empty());
        assert_eq!(framer.push(&bytes[2..]), vec!["héllo"]);
    }

    #[test]
    fn framer_flushes_unterminated_tail() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"no newline").is_empty());
        assert_eq!(framer.finish(), "no newline");
    }

    #[tokio::test]
    async fn paragraph_breaks_append_a_blank_line_per_fragment() {
        let (tx, mut rx) = mpsc::channel(4);
        assert!(emit(&tx, "", true).await, "blank lines are skipped, not sent");
        for line in ["a", "b", "c"] {
            assert!(emit(&tx, line, true).await);
        }
        drop(tx);
        let mut reply = String::new();
        while let Some(StreamEvent::Fragment(text)) = rx.recv().await {
            reply.push_str(&text);
        }
        assert_eq!(reply, "a\n\nb\n\nc\n\n");
    }
}

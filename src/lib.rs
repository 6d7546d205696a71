//! Terminal chat client for assistant endpoints.
//!
//! A conversation is an ordered list of role-tagged turns, seeded with a
//! system prompt. Each send posts the full history to the endpoint and
//! renders the reply either whole (`POST /chat`) or as it streams in
//! (`POST /chat_stream`). A keyword router picks the mode per message;
//! `/mode` or `--mode` pins it.

pub mod app;
pub mod assembler;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod routing;
pub mod ui;

pub use assembler::{Assembler, SendOutcome, SendPhase};
pub use client::{ChatClient, StreamEvent};
pub use config::Config;
pub use conversation::{Conversation, Role, Turn};
pub use error::{ChatError, ConfigError};
pub use routing::{KeywordRouter, RouteOverride, RoutePolicy, SendMode};

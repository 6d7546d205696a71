//! Terminal UI components for the chat interface

pub mod commands;
pub mod composer;
pub mod history;

pub use commands::{get_help_text, ParsedCommand, SlashCommand};
pub use composer::{Composer, ComposerResult};
pub use history::Transcript;

//! Request-mode selection for outgoing sends.
//!
//! The default policy routes calculation-flavored messages to the whole-reply
//! endpoint and everything else to the streaming endpoint. The policy sits
//! behind a trait so it can be swapped without touching the assembler.

use strum::EnumString;

/// How the reply for one send is transported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// One JSON body carrying the complete reply.
    Whole,
    /// A chunked body consumed as fragments.
    Streaming,
}

impl SendMode {
    pub fn label(self) -> &'static str {
        match self {
            SendMode::Whole => "whole",
            SendMode::Streaming => "stream",
        }
    }
}

/// Decides the transport for one outgoing user message. Evaluated once per
/// send, before the request is issued.
pub trait RoutePolicy: Send + Sync {
    fn classify(&self, text: &str) -> SendMode;
}

/// Phrases that route a message to the whole-reply endpoint. Matched as
/// lowercase substrings.
const CALCULATION_KEYWORDS: &[&str] = &[
    "calculate",
    "compute",
    "solve",
    "equation",
    "arithmetic",
    "math",
    "how much is",
    "sum of",
];

/// Default policy: a fixed-keyword membership test over the outgoing text.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRouter;

impl RoutePolicy for KeywordRouter {
    fn classify(&self, text: &str) -> SendMode {
        let lower = text.to_lowercase();
        if CALCULATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            SendMode::Whole
        } else {
            SendMode::Streaming
        }
    }
}

/// User-facing routing override, set from the `--mode` flag or the `/mode`
/// command. `Auto` defers to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RouteOverride {
    #[default]
    Auto,
    Whole,
    Stream,
}

impl RouteOverride {
    /// The forced mode, or `None` when the policy should decide.
    pub fn forced(self) -> Option<SendMode> {
        match self {
            RouteOverride::Auto => None,
            RouteOverride::Whole => Some(SendMode::Whole),
            RouteOverride::Stream => Some(SendMode::Streaming),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RouteOverride::Auto => "auto",
            RouteOverride::Whole => "whole",
            RouteOverride::Stream => "stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn calculation_phrasing_routes_to_whole_reply() {
        let router = KeywordRouter;
        for text in [
            "calculate 17 * 23 for me",
            "Can you SOLVE this equation?",
            "what is the sum of 1 through 100",
            "how much is 40% of 90",
        ] {
            assert_eq!(router.classify(text), SendMode::Whole, "text: {text}");
        }
    }

    #[test]
    fn ordinary_chat_routes_to_streaming() {
        let router = KeywordRouter;
        for text in [
            "tell me about rust lifetimes",
            "write a haiku about autumn",
            "what did I ask you earlier?",
        ] {
            assert_eq!(router.classify(text), SendMode::Streaming, "text: {text}");
        }
    }

    #[test]
    fn override_parses_and_forces() {
        assert_eq!(RouteOverride::from_str("auto").unwrap(), RouteOverride::Auto);
        assert_eq!(
            RouteOverride::from_str("whole").unwrap().forced(),
            Some(SendMode::Whole)
        );
        assert_eq!(
            RouteOverride::from_str("stream").unwrap().forced(),
            Some(SendMode::Streaming)
        );
        assert_eq!(RouteOverride::Auto.forced(), None);
        assert!(RouteOverride::from_str("other").is_err());
    }
}

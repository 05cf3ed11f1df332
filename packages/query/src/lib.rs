#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ordered token model for gazetteer search queries.
//!
//! A [`Query`] is an immutable token sequence sharing the token/ordering
//! vocabulary of address rendering. The serving layer peels tokens from
//! the tail ([`Query::head`] / [`Query::tail`]) to drive progressive
//! prefix-matching; this crate holds no geometry and performs no I/O.

use serde::{Deserialize, Serialize};

/// One query token plus its tokenizer classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QToken {
    text: String,
    optional: bool,
}

impl QToken {
    /// A required (non-optional) token.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            optional: false,
        }
    }

    /// A token the upstream tokenizer marked optional.
    #[must_use]
    pub fn optional(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            optional: true,
        }
    }

    /// The token text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the tokenizer marked this token optional.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether the token consists solely of ASCII digits.
    #[must_use]
    pub fn is_numbers_only(&self) -> bool {
        !self.text.is_empty() && self.text.bytes().all(|b| b.is_ascii_digit())
    }
}

impl std::fmt::Display for QToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// An ordered, immutable sequence of query tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    tokens: Vec<QToken>,
}

impl Query {
    /// A query over the given tokens, in order.
    #[must_use]
    pub fn new(tokens: Vec<QToken>) -> Self {
        Self { tokens }
    }

    /// All tokens except the last; `None` when fewer than 2 tokens exist.
    #[must_use]
    pub fn head(&self) -> Option<Self> {
        if self.tokens.len() > 1 {
            Some(Self {
                tokens: self.tokens[..self.tokens.len() - 1].to_vec(),
            })
        } else {
            None
        }
    }

    /// Only the last token; `None` when the query is empty.
    #[must_use]
    pub fn tail(&self) -> Option<Self> {
        self.tokens.last().map(|last| Self {
            tokens: vec![last.clone()],
        })
    }

    /// Total number of tokens.
    #[must_use]
    pub fn count_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Number of tokens consisting solely of digits.
    #[must_use]
    pub fn count_numeric(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_numbers_only()).count()
    }

    /// Number of tokens marked optional by the tokenizer.
    #[must_use]
    pub fn count_optional(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_optional()).count()
    }

    /// The tokens, in original order.
    #[must_use]
    pub fn tokens(&self) -> &[QToken] {
        &self.tokens
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(token.text())?;
        }
        Ok(())
    }
}

//! Prompt builder.
//!
//! Layout:
//!
//! ```text
//! {instructions}
//!
//! Context:
//! {context}
//!
//! User question: {query}
//! ```
//!
//! With an empty context the `Context:` section is dropped. Backends that
//! take a separate system prompt split on [`QUESTION_MARKER`].

use ragline_core::{Error, GenerationConfig};

use crate::context::estimate_tokens;

/// Boundary between the system part and the user part of a prompt.
pub const QUESTION_MARKER: &str = "\n\nUser question:";

const CONTEXT_HEADER: &str = "\n\nContext:\n";

/// A finished prompt and its estimated size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub token_count: usize,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    instructions: String,
}

impl PromptBuilder {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    fn prefix(&self) -> String {
        format!("{}{CONTEXT_HEADER}", self.instructions)
    }

    fn suffix(query: &str) -> String {
        format!("{QUESTION_MARKER} {query}")
    }

    /// Tokens taken by everything except the context.
    ///
    /// The context is placed between the prefix and the suffix, so by
    /// subadditivity `estimate(prompt) <= overhead + estimate(context)`.
    pub fn overhead_tokens(&self, query: &str) -> usize {
        estimate_tokens(&self.prefix()) + estimate_tokens(&Self::suffix(query))
    }

    /// Compose the prompt, refusing it if it leaves no room for the answer.
    pub fn build(&self, context: &str, query: &str, config: &GenerationConfig) -> Result<Prompt, Error> {
        let text = if context.is_empty() {
            format!("{}{}", self.instructions, Self::suffix(query))
        } else {
            format!("{}{}{}", self.prefix(), context, Self::suffix(query))
        };

        let token_count = estimate_tokens(&text);
        let limit = config.prompt_limit();
        if token_count > limit {
            return Err(Error::ContextOverflow {
                prompt_tokens: token_count,
                limit,
            });
        }

        Ok(Prompt { text, token_count })
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(ragline_config::default_instructions())
    }
}

//! Personas - the system prompts the Completion Adapter prepends.
//!
//! A request names a persona with a selector (`prompt_type`). Unknown or
//! missing selectors fall back to the configured default; the built-in
//! personas are always available unless overridden by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

pub const STANDARD: &str = "standard";
pub const ENTHUSIASTIC: &str = "enthusiastic";

fn standard_prompt() -> String {
    concat!(
        "You are a friendly, knowledgeable shopping assistant for an online store. ",
        "Help customers find products, answer questions about policies and orders, ",
        "and guide them toward a purchase when they show buying intent. ",
        "Use the available tools to look up real catalog data instead of guessing. ",
        "Keep answers short and conversational.",
    )
    .into()
}

fn enthusiastic_prompt() -> String {
    concat!(
        "You are an upbeat, energetic shopping assistant for an online store. ",
        "Celebrate great finds, highlight what makes each product special, ",
        "and keep the customer excited about their purchase. ",
        "Always use the available tools to fetch real product data. ",
        "Stay concise even when you are excited.",
    )
    .into()
}

/// The set of selectable system prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSet {
    /// Selector used when a request names none or an unknown one
    pub default: String,

    /// Selector → system prompt
    pub prompts: BTreeMap<String, String>,
}

impl Default for PersonaSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PersonaSet {
    /// The built-in personas with `standard` as the default.
    pub fn builtin() -> Self {
        let mut prompts = BTreeMap::new();
        prompts.insert(STANDARD.to_string(), standard_prompt());
        prompts.insert(ENTHUSIASTIC.to_string(), enthusiastic_prompt());
        Self {
            default: STANDARD.to_string(),
            prompts,
        }
    }

    /// Built-ins overlaid with `overrides`, using `default` as the fallback.
    pub fn with_overrides(default: impl Into<String>, overrides: BTreeMap<String, String>) -> Self {
        let mut set = Self::builtin();
        set.prompts.extend(overrides);
        set.default = default.into();
        set
    }

    /// Resolve a selector to a system prompt.
    pub fn resolve(&self, selector: Option<&str>) -> &str {
        if let Some(sel) = selector {
            if let Some(prompt) = self.prompts.get(sel) {
                return prompt;
            }
            warn!(persona = sel, fallback = %self.default, "Unknown persona selector");
        }
        self.prompts
            .get(&self.default)
            .or_else(|| self.prompts.get(STANDARD))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn names(&self) -> Vec<&str> {
        self.prompts.keys().map(String::as_str).collect()
    }
}

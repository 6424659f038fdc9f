//! Built-in tools for Parley.
//!
//! # Main entry points
//!
//! - [`register_builtins()`]: Register the standard set of built-in tools.
//! - [`WebSearchSkill`]: Web search backed by SerpAPI.

/// Web search skill (SerpAPI).
pub mod web_search;

pub use web_search::{SearchConfig, WebSearchArgs, WebSearchSkill};

use parley_core::ParleyResult;
use parley_skills::SkillRegistry;
use std::sync::Arc;

/// Register all built-in tools into the given registry.
pub fn register_builtins(registry: &mut SkillRegistry, search: SearchConfig) -> ParleyResult<()> {
    registry.register(Arc::new(WebSearchSkill::new(search)?))?;
    Ok(())
}

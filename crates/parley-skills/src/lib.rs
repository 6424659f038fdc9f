//! Tools ("skills") callable by the agent, and the invoker that runs them.
//!
//! A [`Skill`] declares itself with a [`ToolDeclaration`](parley_core::ToolDeclaration)
//! and turns JSON arguments into a text result. The [`SkillRegistry`] is the
//! tool invoker: it looks tools up by name, validates arguments against the
//! declared schema, bounds execution time, and folds every failure into a
//! text result so a tool can never abort a conversation.

/// Skill registry and tool invocation.
pub mod registry;
pub mod schema;
/// The skill trait.
pub mod skill;

pub use registry::SkillRegistry;
pub use schema::validate_arguments;
pub use skill::Skill;

//! Agent module - context and the per-domain call → tool → result loop.

mod base;
mod context;
mod profile;

pub use base::{AgentError, AgentEvent, AgentReply, BaseAgent};
pub use context::AgentContext;
pub use profile::{profiles, AgentProfile};

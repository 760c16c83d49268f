pub mod correction;
pub mod events;
pub mod extraction;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod registry;

pub use events::AgentEvent;
pub use orchestrator::{Orchestrator, TurnRequest};
pub use registry::{Tool, ToolContext, ToolRegistry};

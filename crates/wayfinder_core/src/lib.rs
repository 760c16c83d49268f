pub mod config;
pub mod error;
pub mod model;
pub mod retry;
pub mod store;

pub use config::WayfinderConfig;
pub use error::TurnError;
pub use model::{Message, PreferenceFact, Role, SessionSummary, ToolCall, ToolResult};
pub use store::{CheckpointStore, PreferenceStore};

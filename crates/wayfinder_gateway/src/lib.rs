pub mod server;
pub mod types;

pub use server::{app, GatewayServer};
pub use types::ChatRequest;

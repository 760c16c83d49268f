//! External capability adapters.
//!
//! Each adapter implements the agent's `Tool` trait and normalizes its
//! native failure modes (HTTP status, timeout, malformed input, missing
//! credentials) into error outcomes. Adapters never panic and never return
//! `Err` past the execution step; a broken upstream becomes data the model
//! can correct against.

pub mod aircraft;
pub mod flights;
pub mod workspace;

use anyhow::Result;
use std::sync::Arc;
use wayfinder_agent::registry::ToolRegistry;
use wayfinder_core::config::AmadeusConfig;

pub use flights::{AirportLookupTool, AmadeusClient, SearchFlightsTool};

/// String at a JSON path, or the fallback. Upstream payloads omit fields
/// freely; result shaping substitutes placeholders instead of failing.
pub(crate) fn opt_str(value: &serde_json::Value, fallback: &str) -> String {
    value.as_str().unwrap_or(fallback).to_string()
}

/// Register the standard travel tool set. Flight search needs Amadeus
/// credentials; without them the remaining tools are still registered so the
/// agent degrades instead of refusing to start.
pub fn register_default_tools(registry: &mut ToolRegistry, amadeus: &AmadeusConfig) -> Result<()> {
    match AmadeusClient::from_config(amadeus) {
        Ok(client) => {
            let client = Arc::new(client);
            registry.register(Arc::new(flights::SearchFlightsTool::new(client.clone())));
            registry.register(Arc::new(flights::AirportLookupTool::new(client)));
        }
        Err(e) => {
            tracing::warn!("Flight search disabled: {}", e);
        }
    }
    registry.register(Arc::new(aircraft::CallsignLookupTool::new()?));
    registry.register(Arc::new(aircraft::RegistrationLookupTool::new()?));
    registry.register(Arc::new(workspace::TripDocumentTool::new()?));
    registry.register(Arc::new(workspace::CalendarEventTool::new()?));
    Ok(())
}

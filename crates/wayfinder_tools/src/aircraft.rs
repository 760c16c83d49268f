//! ADSBDB aircraft lookups. Free API, no key required.

use crate::opt_str;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use wayfinder_agent::llm::ToolSpec;
use wayfinder_agent::registry::{object_schema, Tool, ToolContext, ToolOutcome};

const ADSBDB_BASE: &str = "https://api.adsbdb.com/v0";
const TIMEOUT: Duration = Duration::from_secs(10);

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// GET a lookup endpoint, mapping 404 and timeouts to error outcomes with
/// messages the model can read.
async fn fetch(client: &reqwest::Client, url: &str, subject: &str) -> std::result::Result<Value, String> {
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => return Err("ADSBDB request timed out".to_string()),
        Err(e) => return Err(format!("ADSBDB error: {}", e)),
    };
    match response.status().as_u16() {
        200 => response
            .json::<Value>()
            .await
            .map_err(|e| format!("ADSBDB error: {}", e)),
        404 => Err(format!("{} not found in ADSBDB", subject)),
        status => Err(format!("ADSBDB returned status {}", status)),
    }
}

// ============================================================================
// search_aircraft_by_callsign
// ============================================================================

#[derive(Deserialize)]
struct CallsignArgs {
    callsign: String,
}

pub struct CallsignLookupTool {
    client: reqwest::Client,
    base_url: String,
}

impl CallsignLookupTool {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: ADSBDB_BASE.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Tool for CallsignLookupTool {
    fn name(&self) -> &str {
        "search_aircraft_by_callsign"
    }

    fn description(&self) -> &str {
        "Look up route and aircraft information by airline callsign (e.g. \
         'LY316'). Use this to enrich flight results with aircraft details."
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: object_schema(
                json!({
                    "callsign": {"type": "string", "description": "Airline callsign, e.g. 'LY316'"}
                }),
                &["callsign"],
            ),
        }
    }

    async fn invoke(&self, arguments: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let args: CallsignArgs = match serde_json::from_value(arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::err(format!("Invalid arguments: {}", e)),
        };
        let callsign = args.callsign.trim().to_uppercase();
        let url = format!("{}/callsign/{}", self.base_url, callsign);
        match fetch(&self.client, &url, &format!("Callsign {}", callsign)).await {
            Ok(body) => match shape_callsign(&body, &callsign) {
                Ok(shaped) => ToolOutcome::Ok(shaped),
                Err(e) => ToolOutcome::Err(e),
            },
            Err(e) => ToolOutcome::Err(e),
        }
    }
}

fn shape_callsign(body: &Value, callsign: &str) -> std::result::Result<Value, String> {
    let route = &body["response"]["flightroute"];
    if route.is_null() || route.as_object().is_some_and(|o| o.is_empty()) {
        return Err(format!("No route data found for callsign {}", callsign));
    }
    let aircraft = &route["aircraft"];
    Ok(json!({
        "callsign": callsign,
        "airline": opt_str(&route["airline"]["name"], "Unknown"),
        "origin": opt_str(&route["origin"]["iata_code"], "?"),
        "destination": opt_str(&route["destination"]["iata_code"], "?"),
        "aircraft_type": opt_str(&aircraft["type"], "Unknown"),
        "aircraft_manufacturer": opt_str(&aircraft["manufacturer"], "Unknown"),
        "registration": opt_str(&aircraft["registration"], "N/A"),
    }))
}

// ============================================================================
// search_aircraft_by_registration
// ============================================================================

#[derive(Deserialize)]
struct RegistrationArgs {
    registration: String,
}

pub struct RegistrationLookupTool {
    client: reqwest::Client,
    base_url: String,
}

impl RegistrationLookupTool {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: ADSBDB_BASE.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Tool for RegistrationLookupTool {
    fn name(&self) -> &str {
        "search_aircraft_by_registration"
    }

    fn description(&self) -> &str {
        "Look up aircraft details by registration (tail number), e.g. \
         '4X-EHA'. Returns aircraft type, operator, and manufacturer."
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: object_schema(
                json!({
                    "registration": {"type": "string", "description": "Aircraft registration, e.g. '4X-EHA'"}
                }),
                &["registration"],
            ),
        }
    }

    async fn invoke(&self, arguments: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let args: RegistrationArgs = match serde_json::from_value(arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::err(format!("Invalid arguments: {}", e)),
        };
        let registration = args.registration.trim().to_uppercase();
        let url = format!("{}/aircraft/{}", self.base_url, registration);
        match fetch(
            &self.client,
            &url,
            &format!("Registration {}", registration),
        )
        .await
        {
            Ok(body) => match shape_registration(&body, &registration) {
                Ok(shaped) => ToolOutcome::Ok(shaped),
                Err(e) => ToolOutcome::Err(e),
            },
            Err(e) => ToolOutcome::Err(e),
        }
    }
}

fn shape_registration(body: &Value, registration: &str) -> std::result::Result<Value, String> {
    let aircraft = &body["response"]["aircraft"];
    if aircraft.is_null() || aircraft.as_object().is_some_and(|o| o.is_empty()) {
        return Err(format!(
            "No aircraft found for registration {}",
            registration
        ));
    }
    Ok(json!({
        "registration": registration,
        "type": opt_str(&aircraft["type"], "Unknown"),
        "manufacturer": opt_str(&aircraft["manufacturer"], "Unknown"),
        "operator": opt_str(&aircraft["registered_owner"], "Unknown"),
        "country": opt_str(&aircraft["registered_owner_country_name"], "Unknown"),
    }))
}

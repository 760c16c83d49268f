//! Google Workspace adapters: trip itinerary document and calendar event.
//!
//! Both tools require a per-turn OAuth bearer token carried in the
//! `ToolContext`; without one they return an authentication error outcome
//! the model relays to the user. Confirmation gating ("only after the user
//! says yes") lives in the system prompt, not here.

use crate::opt_str;
use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use wayfinder_agent::llm::ToolSpec;
use wayfinder_agent::registry::{object_schema, Tool, ToolContext, ToolOutcome};

const DOCS_BASE: &str = "https://docs.googleapis.com/v1";
const DRIVE_BASE: &str = "https://www.googleapis.com/drive/v3";
const CALENDAR_BASE: &str = "https://www.googleapis.com/calendar/v3";

const AUTH_REQUIRED: &str =
    "Google authentication required. Please connect your Google account.";

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    body: &Value,
) -> Result<Value> {
    let response = client
        .post(url)
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;
    let status = response.status();
    let text = response.text().await.context("Failed to read response")?;
    if !status.is_success() {
        bail!("Google API returned {}: {}", status, text);
    }
    serde_json::from_str(&text).context("Failed to decode Google API response")
}

// ============================================================================
// create_trip_document
// ============================================================================

#[derive(Deserialize)]
struct TripDocumentArgs {
    destination: String,
    origin: String,
    departure_date: String,
    adults: u32,
    /// JSON string of flight options, as serialized by the model from
    /// earlier search_flights output.
    flights: String,
    #[serde(default)]
    return_date: String,
    #[serde(default)]
    preferences: String,
}

pub struct TripDocumentTool {
    client: reqwest::Client,
}

impl TripDocumentTool {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

#[async_trait::async_trait]
impl Tool for TripDocumentTool {
    fn name(&self) -> &str {
        "create_trip_document"
    }

    fn description(&self) -> &str {
        "Create a Google Docs trip itinerary document. Only call this after \
         explicit user confirmation. Returns the document URL on success."
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: object_schema(
                json!({
                    "destination": {"type": "string", "description": "Trip destination city/country"},
                    "origin": {"type": "string", "description": "Trip origin city/country"},
                    "departure_date": {"type": "string", "description": "Departure date string"},
                    "adults": {"type": "integer", "description": "Number of travelers"},
                    "flights": {"type": "string", "description": "JSON string of flight options (top 3 results)"},
                    "return_date": {"type": "string", "description": "Return date string (empty for one-way)"},
                    "preferences": {"type": "string", "description": "User's travel preferences"}
                }),
                &["destination", "origin", "departure_date", "adults", "flights"],
            ),
        }
    }

    async fn invoke(&self, arguments: &Value, ctx: &ToolContext) -> ToolOutcome {
        let args: TripDocumentArgs = match serde_json::from_value(arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::err(format!("Invalid arguments: {}", e)),
        };
        let Some(token) = ctx.google_token.as_deref() else {
            return ToolOutcome::err(AUTH_REQUIRED);
        };

        let title = format!(
            "Wayfinder Trip: {} to {} ({})",
            args.origin, args.destination, args.departure_date
        );
        let body_text = render_itinerary(&args);

        let result: Result<Value> = async {
            let doc = post_json(
                &self.client,
                &format!("{}/documents", DOCS_BASE),
                token,
                &json!({ "title": title }),
            )
            .await?;
            let doc_id = doc["documentId"]
                .as_str()
                .context("Document create response missing documentId")?
                .to_string();

            post_json(
                &self.client,
                &format!("{}/documents/{}:batchUpdate", DOCS_BASE, doc_id),
                token,
                &json!({
                    "requests": [{
                        "insertText": {
                            "location": { "index": 1 },
                            "text": body_text,
                        }
                    }]
                }),
            )
            .await?;

            // Anyone-with-the-link, read only.
            post_json(
                &self.client,
                &format!("{}/files/{}/permissions", DRIVE_BASE, doc_id),
                token,
                &json!({ "type": "anyone", "role": "reader" }),
            )
            .await?;

            Ok(json!({
                "success": true,
                "doc_url": format!("https://docs.google.com/document/d/{}/edit", doc_id),
                "doc_id": doc_id,
                "title": title,
            }))
        }
        .await;

        match result {
            Ok(shaped) => ToolOutcome::Ok(shaped),
            Err(e) => ToolOutcome::err(format!("Failed to create document: {}", e)),
        }
    }
}

/// Keep only the first `max` flight options and strip verbose fields, so the
/// document stays readable regardless of how the model serialized them.
fn trim_flights(flights_json: &str, max: usize) -> Vec<Value> {
    let parsed: Value = match serde_json::from_str(flights_json) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    // The model sometimes wraps the list in an object key.
    let list = match parsed {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| v.as_array().cloned())
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    list.into_iter()
        .filter(|f| f.is_object())
        .take(max)
        .map(|f| {
            let leg = &f["legs"][0];
            json!({
                "airline_code": opt_str(&f["airline_code"], "?"),
                "price": opt_str(&f["price"], "?"),
                "duration": opt_str(&leg["duration"], "?"),
                "stops": leg["stops"].as_u64().map(|s| s.to_string()).unwrap_or_else(|| "?".to_string()),
            })
        })
        .collect()
}

fn render_itinerary(args: &TripDocumentArgs) -> String {
    let flights = trim_flights(&args.flights, 3);
    let flight_text = if flights.is_empty() {
        "No flight data available\n".to_string()
    } else {
        flights
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    "Option {}: {} | {} | Duration: {} | Stops: {}\n",
                    i + 1,
                    opt_str(&f["airline_code"], "?"),
                    opt_str(&f["price"], "?"),
                    opt_str(&f["duration"], "?"),
                    opt_str(&f["stops"], "?"),
                )
            })
            .collect()
    };

    let return_line = if args.return_date.is_empty() {
        "N/A (One-way)".to_string()
    } else {
        args.return_date.clone()
    };
    let preferences = if args.preferences.is_empty() {
        "None specified".to_string()
    } else {
        args.preferences.clone()
    };

    format!(
        "TRIP ITINERARY\n\
         Generated by Wayfinder\n\n\
         TRIP DETAILS\n\
         - Origin: {}\n\
         - Destination: {}\n\
         - Departure: {}\n\
         - Return: {}\n\
         - Travelers: {} adult(s)\n\
         - Preferences: {}\n\n\
         FLIGHT OPTIONS\n\
         {}\n\
         SUGGESTED ITINERARY\n\
         - Day 1: Arrive in {}, check in and explore\n\
         - Day 2-N: Explore local attractions\n\
         - Last Day: Return flight from {}\n\n\
         TIPS\n\
         - Book accommodation in advance\n\
         - Check visa requirements for your passport\n\
         - Travel insurance is recommended\n",
        args.origin,
        args.destination,
        args.departure_date,
        return_line,
        args.adults,
        preferences,
        flight_text,
        args.destination,
        args.destination,
    )
}

// ============================================================================
// create_calendar_event
// ============================================================================

#[derive(Deserialize)]
struct CalendarEventArgs {
    destination: String,
    origin: String,
    departure_date: String,
    #[serde(default)]
    return_date: String,
    #[serde(default)]
    doc_url: String,
    #[serde(default)]
    notes: String,
}

pub struct CalendarEventTool {
    client: reqwest::Client,
}

impl CalendarEventTool {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

#[async_trait::async_trait]
impl Tool for CalendarEventTool {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Create a Google Calendar event for the trip. Only call this after \
         the trip document has been created. Returns the event URL."
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: object_schema(
                json!({
                    "destination": {"type": "string", "description": "Trip destination"},
                    "origin": {"type": "string", "description": "Origin city"},
                    "departure_date": {"type": "string", "description": "Departure date in YYYY-MM-DD format"},
                    "return_date": {"type": "string", "description": "Return date in YYYY-MM-DD format (empty for one-way)"},
                    "doc_url": {"type": "string", "description": "URL of the trip's document"},
                    "notes": {"type": "string", "description": "Extra notes for the event description"}
                }),
                &["destination", "origin", "departure_date"],
            ),
        }
    }

    async fn invoke(&self, arguments: &Value, ctx: &ToolContext) -> ToolOutcome {
        let args: CalendarEventArgs = match serde_json::from_value(arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::err(format!("Invalid arguments: {}", e)),
        };
        let Some(token) = ctx.google_token.as_deref() else {
            return ToolOutcome::err(AUTH_REQUIRED);
        };

        let summary = format!("Trip to {}", args.destination);
        let mut description = format!(
            "Trip planned by Wayfinder\n\nRoute: {} to {} to {}\n",
            args.origin, args.destination, args.origin
        );
        if !args.doc_url.is_empty() {
            description.push_str(&format!("\nFull itinerary: {}\n", args.doc_url));
        }
        if !args.notes.is_empty() {
            description.push_str(&format!("\nNotes: {}\n", args.notes));
        }

        let end_date = exclusive_end_date(&args.departure_date, &args.return_date);
        let event = json!({
            "summary": summary,
            "description": description,
            "start": { "date": args.departure_date },
            "end": { "date": end_date },
            "reminders": {
                "useDefault": false,
                "overrides": [
                    { "method": "popup", "minutes": 60 * 24 * 3 },
                    { "method": "popup", "minutes": 60 * 24 },
                    { "method": "email", "minutes": 60 * 24 * 7 }
                ]
            }
        });

        let url = format!("{}/calendars/primary/events", CALENDAR_BASE);
        match post_json(&self.client, &url, token, &event).await {
            Ok(created) => ToolOutcome::Ok(json!({
                "success": true,
                "event_url": opt_str(&created["htmlLink"], ""),
                "event_id": opt_str(&created["id"], ""),
                "summary": summary,
            })),
            Err(e) => ToolOutcome::err(format!("Failed to create calendar event: {}", e)),
        }
    }
}

/// All-day events in the Calendar API use an exclusive end date: the day
/// after the trip ends, or the day after departure for one-way trips.
fn exclusive_end_date(departure_date: &str, return_date: &str) -> String {
    let base = if return_date.is_empty() {
        departure_date
    } else {
        return_date
    };
    match NaiveDate::parse_from_str(base, "%Y-%m-%d") {
        Ok(date) => (date + ChronoDuration::days(1))
            .format("%Y-%m-%d")
            .to_string(),
        Err(_) => base.to_string(),
    }
}

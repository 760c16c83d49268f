//! Amadeus flight search and airport lookup.
//!
//! Uses the Amadeus self-service REST API (test environment by default,
//! free tier). OAuth2 client-credentials tokens are cached and refreshed
//! shortly before expiry.

use crate::opt_str;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use wayfinder_agent::llm::ToolSpec;
use wayfinder_agent::registry::{object_schema, Tool, ToolContext, ToolOutcome};
use wayfinder_core::config::AmadeusConfig;
use wayfinder_core::retry::{send_with_retry, RetryConfig};

/// Refresh the cached token this long before the server-reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// API client
// ============================================================================

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct AmadeusClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
    retry: RetryConfig,
    token: Mutex<Option<CachedToken>>,
}

impl AmadeusClient {
    pub fn from_config(config: &AmadeusConfig) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .context("AMADEUS_CLIENT_ID is not configured")?;
        let client_secret = config
            .client_secret
            .clone()
            .context("AMADEUS_CLIENT_SECRET is not configured")?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("Failed to build HTTP client")?,
            client_id,
            client_secret,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
            token: Mutex::new(None),
        })
    }

    /// Current bearer token, fetching a fresh one when the cache is empty or
    /// near expiry. The lock is held across the fetch so concurrent callers
    /// don't stampede the token endpoint.
    async fn bearer(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let url = format!("{}/v1/security/oauth2/token", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .context("Amadeus token request failed")?;
        if !response.status().is_success() {
            bail!("Amadeus token endpoint returned {}", response.status());
        }
        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to decode Amadeus token response")?;

        tracing::debug!("Fetched new Amadeus access token (ttl {}s)", token.expires_in);
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in)
            - TOKEN_EXPIRY_MARGIN.min(Duration::from_secs(token.expires_in));
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });
        Ok(access_token)
    }

    /// GET a JSON endpoint. Non-2xx responses surface the response body in
    /// the error so callers can classify upstream validation failures.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);
        let response = send_with_retry(&self.retry, "amadeus", || async {
            self.http
                .get(&url)
                .bearer_auth(&token)
                .query(query)
                .send()
                .await
                .context("Amadeus request failed")
        })
        .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Amadeus response body")?;
        if !status.is_success() {
            bail!("Amadeus returned {}: {}", status, body);
        }
        serde_json::from_str(&body).context("Failed to decode Amadeus response")
    }
}

// ============================================================================
// search_flights
// ============================================================================

#[derive(Deserialize)]
struct SearchFlightsArgs {
    origin: String,
    destination: String,
    departure_date: String,
    #[serde(default = "default_adults")]
    adults: u32,
    #[serde(default)]
    return_date: Option<String>,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

fn default_adults() -> u32 {
    1
}

fn default_max_results() -> u32 {
    3
}

pub struct SearchFlightsTool {
    client: Arc<AmadeusClient>,
}

impl SearchFlightsTool {
    pub fn new(client: Arc<AmadeusClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for SearchFlightsTool {
    fn name(&self) -> &str {
        "search_flights"
    }

    fn description(&self) -> &str {
        "Search for available flights between two airports. Requires IATA \
         airport codes (e.g. 'TLV', 'JFK'); use search_airport_by_city first \
         if you only have a city name. Returns offers with price, airline, \
         duration, and stops."
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: object_schema(
                json!({
                    "origin": {"type": "string", "description": "IATA airport code for departure, e.g. 'TLV'"},
                    "destination": {"type": "string", "description": "IATA airport code for arrival, e.g. 'FCO'"},
                    "departure_date": {"type": "string", "description": "Date in YYYY-MM-DD format"},
                    "adults": {"type": "integer", "description": "Number of adult passengers (default 1)"},
                    "return_date": {"type": "string", "description": "Return date in YYYY-MM-DD format (omit for one-way)"},
                    "max_results": {"type": "integer", "description": "Max offers to return (default 3)"}
                }),
                &["origin", "destination", "departure_date"],
            ),
        }
    }

    async fn invoke(&self, arguments: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let args: SearchFlightsArgs = match serde_json::from_value(arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::err(format!("Invalid arguments: {}", e)),
        };

        let origin = args.origin.trim().to_uppercase();
        let destination = args.destination.trim().to_uppercase();
        let mut query = vec![
            ("originLocationCode", origin.clone()),
            ("destinationLocationCode", destination.clone()),
            ("departureDate", args.departure_date.clone()),
            ("adults", args.adults.to_string()),
            ("max", args.max_results.to_string()),
            ("currencyCode", "USD".to_string()),
        ];
        if let Some(return_date) = &args.return_date {
            if !return_date.is_empty() {
                query.push(("returnDate", return_date.clone()));
            }
        }

        match self.client.get("/v2/shopping/flight-offers", &query).await {
            Ok(body) => {
                let offers = body["data"].as_array().cloned().unwrap_or_default();
                if offers.is_empty() {
                    return ToolOutcome::err(format!(
                        "No flights found for {} to {} on {}; try adjacent dates or check the IATA codes",
                        origin, destination, args.departure_date
                    ));
                }
                ToolOutcome::Ok(shape_offers(&offers))
            }
            Err(e) => ToolOutcome::err(classify_flight_error(&e.to_string(), &origin, &destination)),
        }
    }
}

/// Flatten raw Amadeus offers into the compact shape the model works with.
fn shape_offers(offers: &[Value]) -> Value {
    let flights: Vec<Value> = offers
        .iter()
        .map(|offer| {
            let airline = offer["validatingAirlineCodes"][0]
                .as_str()
                .unwrap_or("?")
                .to_string();
            let price = format!(
                "${} {}",
                opt_str(&offer["price"]["grandTotal"], "?"),
                opt_str(&offer["price"]["currency"], "USD"),
            );
            let legs: Vec<Value> = offer["itineraries"]
                .as_array()
                .map(|itins| itins.iter().map(|itin| shape_leg(itin, &airline)).collect())
                .unwrap_or_default();
            json!({
                "price": price,
                "airline_code": airline,
                "legs": legs,
            })
        })
        .collect();
    json!({ "flights": flights, "count": flights.len() })
}

fn shape_leg(itinerary: &Value, airline: &str) -> Value {
    let segments = itinerary["segments"].as_array().cloned().unwrap_or_default();
    let stops = segments.len().saturating_sub(1);
    let departure = segments
        .first()
        .map(|s| opt_str(&s["departure"]["at"], "?"))
        .unwrap_or_else(|| "?".to_string());
    let arrival = segments
        .last()
        .map(|s| opt_str(&s["arrival"]["at"], "?"))
        .unwrap_or_else(|| "?".to_string());
    // ISO 8601 "PT7H30M" reads better to the model as "7h30m".
    let duration = opt_str(&itinerary["duration"], "PT?H")
        .replace("PT", "")
        .to_lowercase();
    json!({
        "departure": departure,
        "arrival": arrival,
        "duration": duration,
        "stops": stops,
        "airline": airline,
    })
}

/// Map an upstream failure to a message the correction cycle can act on. An
/// invalid location code must point the model at the airport lookup tool.
fn classify_flight_error(message: &str, origin: &str, destination: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("invalid format") || lower.contains("locationcode") {
        return format!(
            "Invalid IATA airport code: look up the correct code for '{}' or '{}' with search_airport_by_city",
            origin, destination
        );
    }
    format!("Amadeus API error: {}", message)
}

// ============================================================================
// search_airport_by_city
// ============================================================================

#[derive(Deserialize)]
struct AirportLookupArgs {
    city_name: String,
}

pub struct AirportLookupTool {
    client: Arc<AmadeusClient>,
}

impl AirportLookupTool {
    pub fn new(client: Arc<AmadeusClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for AirportLookupTool {
    fn name(&self) -> &str {
        "search_airport_by_city"
    }

    fn description(&self) -> &str {
        "Search for airport IATA codes by city name. Use this when the user \
         gives a city name instead of an IATA code, or when search_flights \
         reports an invalid IATA code."
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: object_schema(
                json!({
                    "city_name": {"type": "string", "description": "Name of the city, e.g. 'Barcelona', 'Tel Aviv'"}
                }),
                &["city_name"],
            ),
        }
    }

    async fn invoke(&self, arguments: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let args: AirportLookupArgs = match serde_json::from_value(arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::err(format!("Invalid arguments: {}", e)),
        };

        let query = vec![
            ("keyword", args.city_name.clone()),
            ("subType", "AIRPORT,CITY".to_string()),
        ];
        match self.client.get("/v1/reference-data/locations", &query).await {
            Ok(body) => {
                let locations = body["data"].as_array().cloned().unwrap_or_default();
                if locations.is_empty() {
                    return ToolOutcome::err(format!(
                        "No airports found for '{}'",
                        args.city_name
                    ));
                }
                ToolOutcome::Ok(shape_locations(&locations))
            }
            Err(e) => ToolOutcome::err(format!("Amadeus error: {}", e)),
        }
    }
}

/// Top 5 matches, compacted.
fn shape_locations(locations: &[Value]) -> Value {
    let airports: Vec<Value> = locations
        .iter()
        .take(5)
        .map(|loc| {
            json!({
                "iata_code": opt_str(&loc["iataCode"], "?"),
                "name": opt_str(&loc["name"], "?"),
                "city": opt_str(&loc["address"]["cityName"], "?"),
                "country": opt_str(&loc["address"]["countryName"], "?"),
            })
        })
        .collect();
    json!({ "airports": airports })
}

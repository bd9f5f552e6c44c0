//! Daejeon BIS (bus information system) client and its tool handlers
//!
//! Two lookups against the city OpenAPI: station search by keyword and
//! real-time arrivals by station id, both returning XML. The two registered
//! tools compose them; every failure ends up as an `error` field in the
//! returned value, never as an error crossing the tool boundary.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::config::TransitConfig;
use crate::tools::{ToolDeclaration, ToolRegistry};
use crate::{Error, Result};

/// Per-request timeout for the transit API
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One bus approaching a station
#[derive(Debug, Clone, serde::Serialize)]
pub struct BusArrival {
    /// Route number (e.g. "102")
    pub bus_no: String,
    /// Minutes until arrival
    pub arrival_min: i64,
    /// Route destination (terminus direction)
    pub destination: String,
    /// Stops away from the station
    pub status_pos: i64,
}

/// Arrival lookup result for one station
#[derive(Debug)]
struct ArrivalInfo {
    station_id: String,
    buses: Vec<BusArrival>,
    error: Option<String>,
}

/// Client for the Daejeon BIS OpenAPI
pub struct TransitClient {
    client: reqwest::Client,
    api_key: String,
    search_url: String,
    arrival_url: String,
    origin_station_id: String,
    origin_station_name: String,
}

impl TransitClient {
    /// Create a client from transit configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &TransitConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            search_url: config.search_url.clone(),
            arrival_url: config.arrival_url.clone(),
            origin_station_id: config.origin_station_id.clone(),
            origin_station_name: config.origin_station_name.clone(),
        })
    }

    /// Look up a station id by (partial) station name
    ///
    /// Returns `None` when the API has no match or the lookup fails; the
    /// caller decides whether that is an error.
    pub async fn station_id_by_name(&self, station_name: &str) -> Option<String> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[("serviceKey", self.api_key.as_str()), ("keyWord", station_name)])
            .send()
            .await;

        let body = match response {
            Ok(r) if r.status().is_success() => r.text().await.ok()?,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "station search failed");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "station search request failed");
                return None;
            }
        };

        match parse_station_search(&body) {
            Ok(Some((id, name))) => {
                tracing::debug!(station = %name, id = %id, "station resolved");
                Some(id)
            }
            Ok(None) => {
                tracing::debug!(keyword = %station_name, "no station matched");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "station search response unparseable");
                None
            }
        }
    }

    /// Fetch real-time arrivals for a station id
    async fn arrivals(&self, station_id: &str) -> ArrivalInfo {
        let response = self
            .client
            .get(&self.arrival_url)
            .query(&[("serviceKey", self.api_key.as_str()), ("BusStopID", station_id)])
            .send()
            .await;

        let body = match response {
            Ok(r) if r.status().is_success() => match r.text().await {
                Ok(body) => body,
                Err(e) => return ArrivalInfo::failed(station_id, e.to_string()),
            },
            Ok(r) => return ArrivalInfo::failed(station_id, format!("HTTP {}", r.status())),
            Err(e) => return ArrivalInfo::failed(station_id, e.to_string()),
        };

        match parse_arrivals(&body) {
            Ok((buses, header_msg)) => {
                let error = if buses.is_empty() { header_msg } else { None };
                tracing::debug!(station_id, routes = buses.len(), "arrival lookup complete");
                ArrivalInfo {
                    station_id: station_id.to_string(),
                    buses,
                    error,
                }
            }
            Err(e) => ArrivalInfo::failed(station_id, e.to_string()),
        }
    }

    /// Tool: real-time arrival info for a named station
    pub async fn bus_arrival_info(&self, station_name: &str) -> Value {
        let Some(station_id) = self.station_id_by_name(station_name).await else {
            return json!({
                "station_name": station_name,
                "buses": [],
                "error": "정류소 ID를 찾을 수 없습니다."
            });
        };

        let info = self.arrivals(&station_id).await;
        let mut result = json!({
            "station_name": station_name,
            "station_id": info.station_id,
            "buses": info.buses,
        });
        if let Some(error) = info.error {
            result["error"] = Value::String(error);
        }
        result
    }

    /// Tool: buses leaving the fixed origin station toward a destination
    ///
    /// Matches by destination-name substring against each route's terminus,
    /// the way riders phrase it ("유성온천역 가는 버스").
    pub async fn direct_bus_from_origin(&self, destination_name: &str) -> Value {
        let destination_id = self.station_id_by_name(destination_name).await;

        let info = self.arrivals(&self.origin_station_id).await;
        if let Some(error) = info.error {
            return json!({
                "start_station": self.origin_station_name,
                "destination_request": destination_name,
                "matching_buses": [],
                "error": error,
            });
        }

        let matching: Vec<&BusArrival> = info
            .buses
            .iter()
            .filter(|bus| bus.destination.contains(destination_name))
            .collect();
        tracing::debug!(destination = %destination_name, matches = matching.len(), "route filter complete");

        json!({
            "start_station": self.origin_station_name,
            "destination_request": destination_name,
            "destination_id_found": destination_id,
            "matching_buses": matching,
        })
    }
}

impl ArrivalInfo {
    fn failed(station_id: &str, error: String) -> Self {
        tracing::warn!(station_id, error = %error, "arrival lookup failed");
        Self {
            station_id: station_id.to_string(),
            buses: Vec::new(),
            error: Some(error),
        }
    }
}

/// Parse a station-search response; `Some((id, name))` for the first match
fn parse_station_search(xml: &str) -> Result<Option<(String, String)>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Transit(e.to_string()))?;

    let Some(item) = doc.descendants().find(|n| n.has_tag_name("itemList")) else {
        if let Some(msg) = header_message(&doc) {
            tracing::debug!(header = %msg, "station search returned no items");
        }
        return Ok(None);
    };

    let id = child_text(item, "BUSSTOP_ID");
    let name = child_text(item, "BUSSTOP_NAME");
    match (id, name) {
        (Some(id), Some(name)) => Ok(Some((id, name))),
        _ => Err(Error::Transit("BUSSTOP_ID tag missing in response".to_string())),
    }
}

/// Parse an arrival response into routes plus the header message, if any
fn parse_arrivals(xml: &str) -> Result<(Vec<BusArrival>, Option<String>)> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Transit(e.to_string()))?;

    let mut buses = Vec::new();
    for item in doc.descendants().filter(|n| n.has_tag_name("itemList")) {
        let bus = BusArrival {
            bus_no: child_text(item, "ROUTE_NO")
                .ok_or_else(|| Error::Transit("ROUTE_NO missing".to_string()))?,
            arrival_min: child_number(item, "EXTIME_MIN")?,
            destination: child_text(item, "DESTINATION")
                .ok_or_else(|| Error::Transit("DESTINATION missing".to_string()))?,
            status_pos: child_number(item, "STATUS_POS")?,
        };
        buses.push(bus);
    }

    Ok((buses, header_message(&doc)))
}

fn header_message(doc: &roxmltree::Document) -> Option<String> {
    doc.descendants()
        .find(|n| n.has_tag_name("headerMsg"))
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
}

fn child_text(node: roxmltree::Node, tag: &str) -> Option<String> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
}

fn child_number(node: roxmltree::Node, tag: &str) -> Result<i64> {
    child_text(node, tag)
        .ok_or_else(|| Error::Transit(format!("{tag} missing")))?
        .parse()
        .map_err(|e| Error::Transit(format!("{tag} not a number: {e}")))
}

/// Register the two transit tools on a registry
pub fn register_tools(registry: &mut ToolRegistry, client: Arc<TransitClient>) {
    let arrival_client = Arc::clone(&client);
    registry.register(
        ToolDeclaration {
            name: "get_bus_arrival_info".to_string(),
            description: "사용자가 '특정 버스 정류장'의 실시간 도착 정보를 물어볼 때 사용합니다."
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "station_name": {
                        "type": "STRING",
                        "description": "정보를 조회할 버스 정류장의 이름"
                    }
                },
                "required": ["station_name"]
            }),
        },
        Arc::new(move |args| {
            let client = Arc::clone(&arrival_client);
            Box::pin(async move {
                let station_name = required_arg(&args, "station_name")?;
                Ok(client.bus_arrival_info(&station_name).await)
            })
        }),
    );

    registry.register(
        ToolDeclaration {
            name: "find_direct_bus_from_city_hall".to_string(),
            description:
                "사용자가 [대전광역시청]에서 출발하여 [다른 목적지]로 가는 버스를 찾을 때 사용합니다."
                    .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "destination_name": {
                        "type": "STRING",
                        "description": "사용자가 가고 싶어하는 최종 목적지 이름"
                    }
                },
                "required": ["destination_name"]
            }),
        },
        Arc::new(move |args| {
            let client = Arc::clone(&client);
            Box::pin(async move {
                let destination = required_arg(&args, "destination_name")?;
                Ok(client.direct_bus_from_origin(&destination).await)
            })
        }),
    );
}

fn required_arg(args: &Value, name: &str) -> Result<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| Error::Tool(format!("필수 인자 누락: {name}")))
}

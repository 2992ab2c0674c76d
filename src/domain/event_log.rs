// Event log domain model - system events appended by the fleet service
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TRAFFIC_SURGE_DETECTED: &str = "TRAFFIC_SURGE_DETECTED";
pub const AUTO_SURGE_PRICING: &str = "AUTO_SURGE_PRICING";
pub const AUTO_SURGE_PRICING_NO_REROUTE: &str = "AUTO_SURGE_PRICING_NO_REROUTE";

/// One entry of the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEventLogEntry", into = "RawEventLogEntry")]
pub struct EventLogEntry {
    pub timestamp: String,
    pub event: LogEvent,
}

/// Typed view of an entry's `details`, keyed by its `action`.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    TrafficSurgeDetected {
        station: Option<String>,
        warning: Option<String>,
    },
    AutoSurgePricing(SurgePricing),
    AutoSurgePricingNoReroute(SurgePricing),
    Unrecognized {
        action: String,
        details: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurgePricing {
    pub stressed_station: Option<String>,
    pub stressed_price_increase: Option<String>,
    pub rerouted_station: Option<String>,
    pub rerouted_price_decrease: Option<String>,
}

impl LogEvent {
    pub fn action(&self) -> &str {
        match self {
            LogEvent::TrafficSurgeDetected { .. } => TRAFFIC_SURGE_DETECTED,
            LogEvent::AutoSurgePricing(_) => AUTO_SURGE_PRICING,
            LogEvent::AutoSurgePricingNoReroute(_) => AUTO_SURGE_PRICING_NO_REROUTE,
            LogEvent::Unrecognized { action, .. } => action.as_str(),
        }
    }

    fn from_parts(action: String, details: Value) -> Self {
        match action.as_str() {
            TRAFFIC_SURGE_DETECTED => LogEvent::TrafficSurgeDetected {
                station: text_field(&details, "station"),
                warning: text_field(&details, "warning"),
            },
            AUTO_SURGE_PRICING => LogEvent::AutoSurgePricing(SurgePricing::from_details(&details)),
            AUTO_SURGE_PRICING_NO_REROUTE => {
                LogEvent::AutoSurgePricingNoReroute(SurgePricing::from_details(&details))
            }
            _ => LogEvent::Unrecognized { action, details },
        }
    }

    fn into_details(self) -> Value {
        match self {
            LogEvent::TrafficSurgeDetected { station, warning } => {
                let mut map = Map::new();
                insert_text(&mut map, "station", station);
                insert_text(&mut map, "warning", warning);
                Value::Object(map)
            }
            LogEvent::AutoSurgePricing(pricing) | LogEvent::AutoSurgePricingNoReroute(pricing) => {
                pricing.into_details()
            }
            LogEvent::Unrecognized { details, .. } => details,
        }
    }
}

impl SurgePricing {
    fn from_details(details: &Value) -> Self {
        Self {
            stressed_station: text_field(details, "stressed_station"),
            stressed_price_increase: text_field(details, "stressed_price_increase"),
            rerouted_station: text_field(details, "rerouted_station"),
            rerouted_price_decrease: text_field(details, "rerouted_price_decrease"),
        }
    }

    fn into_details(self) -> Value {
        let mut map = Map::new();
        insert_text(&mut map, "stressed_station", self.stressed_station);
        insert_text(&mut map, "stressed_price_increase", self.stressed_price_increase);
        insert_text(&mut map, "rerouted_station", self.rerouted_station);
        insert_text(&mut map, "rerouted_price_decrease", self.rerouted_price_decrease);
        Value::Object(map)
    }
}

fn text_field(details: &Value, key: &str) -> Option<String> {
    details.get(key).and_then(Value::as_str).map(str::to_string)
}

fn insert_text(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value));
    }
}

/// Wire shape: `{timestamp, action, details}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEventLogEntry {
    #[serde(default)]
    timestamp: String,
    action: String,
    #[serde(default)]
    details: Value,
}

impl From<RawEventLogEntry> for EventLogEntry {
    fn from(raw: RawEventLogEntry) -> Self {
        Self {
            timestamp: raw.timestamp,
            event: LogEvent::from_parts(raw.action, raw.details),
        }
    }
}

impl From<EventLogEntry> for RawEventLogEntry {
    fn from(entry: EventLogEntry) -> Self {
        let action = entry.event.action().to_string();
        Self {
            timestamp: entry.timestamp,
            action,
            details: entry.event.into_details(),
        }
    }
}

/// The entry appended since the previous poll, if the log grew.
///
/// Only the tail is inspected: when several entries arrive within one interval
/// the earlier ones are not surfaced. An empty previous log is treated as the
/// initial load and never reports anything.
pub fn newly_appended(previous_len: usize, log: &[EventLogEntry]) -> Option<&EventLogEntry> {
    if previous_len > 0 && log.len() > previous_len {
        log.last()
    } else {
        None
    }
}

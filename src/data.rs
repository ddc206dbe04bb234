use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::records::IncidentRow;
use crate::travel_times::normalize_key;

/// Seconds on the simulation clock.
pub type Time = i64;

/// British National Grid coordinates (easting, northing).
pub type Node = (f64, f64);

pub type EngineId = usize;

pub const DEFAULT_COOLDOWN_SECONDS: f64 = 180.0;
pub const DEFAULT_REACTION_SECONDS: f64 = 30.0;
pub const DEFAULT_ON_SCENE_SECONDS: f64 = 300.0;

const DEFAULT_TRUE_DRIVING_SECONDS: f64 = 999.0;
const UNKNOWN_RISK: &str = "Unknown";
const HIGH_RISK_LABELS: [&str; 2] = [
    "high risk",
    "secondary fires that attract a 20 minute-response time",
];

const DATE_TIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Available,
    Driving,
    Cooling,
}

impl EngineStatus {
    pub fn index(&self) -> usize {
        match self {
            Self::Available => 0,
            Self::Driving => 1,
            Self::Cooling => 2,
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Available => "AVAILABLE",
            Self::Driving => "DRIVING",
            Self::Cooling => "COOLING",
        };
        f.write_str(label)
    }
}

/// A single fire engine. A dispatch keeps it `Driving` for the whole task
/// (reaction, outbound drive, on-scene work, return drive), after which it
/// spends the cooldown in `Cooling` before becoming `Available` at home.
#[derive(Debug, Clone, Serialize)]
pub struct Engine {
    pub id: EngineId,
    pub home_node: Node,
    pub current_node: Node,
    pub vehicle_type: String,
    pub status: EngineStatus,
    pub remaining_time: f64,
    pub cooldown_duration: f64,
    pub dispatch_count: u32,
    pub total_driving_time: f64,
}

impl Engine {
    pub fn new(id: EngineId, home_node: Node, vehicle_type: &str, cooldown_seconds: f64) -> Self {
        Self {
            id,
            home_node,
            current_node: home_node,
            vehicle_type: vehicle_type.to_uppercase(),
            status: EngineStatus::Available,
            remaining_time: 0.0,
            cooldown_duration: cooldown_seconds,
            dispatch_count: 0,
            total_driving_time: 0.0,
        }
    }

    pub fn assign_to_event(
        &mut self,
        event_node: Node,
        driving_seconds: f64,
        reaction_seconds: f64,
        on_scene_seconds: f64,
    ) {
        // return leg assumed as long as the outbound drive
        let total_active_time = reaction_seconds + driving_seconds + on_scene_seconds + driving_seconds;

        self.status = EngineStatus::Driving;
        self.remaining_time = total_active_time;
        self.current_node = event_node;
        self.dispatch_count += 1;
        self.total_driving_time += driving_seconds;
    }

    /// Advances the engine clock, carrying leftover time across state changes.
    pub fn advance(&mut self, seconds: f64) {
        let mut time_left = seconds.max(0.0);
        // a zero-length phase ends without consuming time
        while self.status != EngineStatus::Available {
            let elapsed = self.remaining_time.min(time_left);
            self.remaining_time -= elapsed;
            time_left -= elapsed;
            if self.remaining_time > 0.0 {
                break;
            }
            self.finish_phase();
        }
    }

    fn finish_phase(&mut self) {
        match self.status {
            EngineStatus::Driving => {
                self.status = EngineStatus::Cooling;
                self.remaining_time = self.cooldown_duration;
                log::debug!("Engine #{} DRIVING -> COOLING", self.id);
            }
            EngineStatus::Cooling => {
                self.status = EngineStatus::Available;
                self.remaining_time = 0.0;
                self.current_node = self.home_node;
                log::debug!("Engine #{} COOLING -> AVAILABLE", self.id);
            }
            EngineStatus::Available => {}
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == EngineStatus::Available
    }

    pub fn average_response_time(&self) -> f64 {
        if self.dispatch_count == 0 {
            return 0.0;
        }
        self.total_driving_time / self.dispatch_count as f64
    }

    pub fn reset(&mut self) {
        self.status = EngineStatus::Available;
        self.remaining_time = 0.0;
        self.current_node = self.home_node;
        self.dispatch_count = 0;
        self.total_driving_time = 0.0;
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Engine#{} STATUS:{} Location:({:.0}, {:.0}) Type:{} Remaining:{:.1}s Dispatches:{}>",
            self.id,
            self.status,
            self.current_node.0,
            self.current_node.1,
            self.vehicle_type,
            self.remaining_time,
            self.dispatch_count
        )
    }
}

/// An incident waiting for, or having received, a mobilisation.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: usize,
    /// Key into the travel time matrix.
    pub incident_index: String,
    pub graph_node: Node,
    pub timestamp: Time,
    pub risk_level: String,
    pub true_driving_seconds: f64,
    pub required_prl: u32,
    pub required_brv: u32,
    pub reaction_seconds: f64,
    pub on_scene_seconds: f64,
    pub station_position: (Option<f64>, Option<f64>),
    pub dispatched_vehicle_count: Option<f64>,
    pub assigned: bool,
    pub responder_id: Option<EngineId>,
    pub response_time: Option<f64>,
}

impl Incident {
    pub fn from_row(row: &IncidentRow, id: usize) -> Self {
        let timestamp = match row.call_time.as_deref().map(str::trim) {
            Some(call_time) if !call_time.is_empty() => seconds_since_origin(call_time)
                .unwrap_or_else(|| {
                    log::warn!("Incident {id}: could not parse call time {call_time:?}, defaulting to 0");
                    0
                }),
            _ => 0,
        };

        let graph_node = row
            .graph_node
            .as_deref()
            .and_then(parse_node)
            .unwrap_or((0.0, 0.0));

        let incident_index = row
            .incident_number
            .as_deref()
            .or(row.incident_index.as_deref())
            .map(normalize_key)
            .unwrap_or_else(|| id.to_string());

        Self {
            id,
            incident_index,
            graph_node,
            timestamp,
            risk_level: row
                .incident_profile_label
                .clone()
                .unwrap_or_else(|| UNKNOWN_RISK.to_owned()),
            true_driving_seconds: row.driving_seconds.unwrap_or(DEFAULT_TRUE_DRIVING_SECONDS),
            required_prl: row.prl_count.map_or(0, |count| count.max(0.0) as u32),
            required_brv: row.brv_count.map_or(0, |count| count.max(0.0) as u32),
            reaction_seconds: row.reaction_seconds.unwrap_or(DEFAULT_REACTION_SECONDS),
            on_scene_seconds: row.on_scene_seconds.unwrap_or(DEFAULT_ON_SCENE_SECONDS),
            station_position: (row.station_easting, row.station_northing),
            dispatched_vehicle_count: row.dispatched_vehicle_count,
            assigned: false,
            responder_id: None,
            response_time: None,
        }
    }

    pub fn mark_responded(&mut self, responder_id: EngineId, response_time: f64) {
        self.assigned = true;
        self.responder_id = Some(responder_id);
        self.response_time = Some(response_time);
        self.true_driving_seconds = response_time;
    }

    pub fn is_high_risk(&self) -> bool {
        let label = self.risk_level.trim().to_lowercase();
        HIGH_RISK_LABELS.contains(&label.as_str())
    }

    /// Number of engines this incident calls for.
    pub fn required_dispatch_count(&self) -> usize {
        match self.dispatched_vehicle_count {
            Some(count) => count.max(0.0) as usize,
            None if self.is_high_risk() => 2,
            None => 1,
        }
    }
}

impl fmt::Display for Incident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<FireEvent#{} Risk:{} Time:{}s Response:",
            self.id, self.risk_level, self.timestamp
        )?;
        match self.response_time {
            Some(response_time) => write!(f, "{response_time:.1}s>"),
            None => write!(f, "none>"),
        }
    }
}

/// Seconds between 2009-01-01T00:00:00 and `call_time`.
fn seconds_since_origin(call_time: &str) -> Option<Time> {
    let origin = NaiveDate::from_ymd_opt(2009, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let parsed = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(call_time, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(call_time, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    Some((parsed - origin).num_seconds())
}

/// Parses `"(x, y)"` (brackets optional) into a node.
fn parse_node(raw: &str) -> Option<Node> {
    let inner = raw
        .trim()
        .trim_start_matches(['(', '['])
        .trim_end_matches([')', ']']);
    let mut parts = inner.split(',').map(|part| part.trim().parse::<f64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => Some((x, y)),
        _ => None,
    }
}

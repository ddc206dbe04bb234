use std::{collections::HashMap, collections::VecDeque, fmt};

use itertools::Itertools;
use serde::Serialize;

use crate::config::SimulationConfig;
use crate::data::*;
use crate::dataset::Dataset;
use crate::records::IncidentRow;
use crate::travel_times::{TravelTimes, UNREACHABLE_SECONDS};

/// Reward returned when an incident could not be served at all.
pub const FAILED_DISPATCH_REWARD: f64 = -1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailure {
    NoEnginesDispatched,
    InvalidActionIndex,
    NoAvailableVehicle,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoEnginesDispatched => "no_engines_dispatched",
            Self::InvalidActionIndex => "invalid_action_index",
            Self::NoAvailableVehicle => "no_available_vehicle",
        };
        f.write_str(label)
    }
}

/// One line of the dispatch log. Failed incidents get a record with no engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRecord {
    pub event_id: usize,
    pub incident_index: String,
    pub engine_id: Option<EngineId>,
    pub station: Option<String>,
    pub response_time: Option<f64>,
    pub risk_level: String,
    pub timestamp: Time,
    /// Only set on the first engine sent to an incident.
    pub dispatched_vehicle_count: Option<usize>,
    pub error: Option<DispatchFailure>,
}

/// What happened to the incident handled by a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub event_id: Option<usize>,
    pub dispatched_engines: Vec<EngineId>,
    pub response_times: Vec<f64>,
    pub min_response_time: Option<f64>,
    pub error: Option<DispatchFailure>,
}

#[derive(Debug)]
pub struct Simulator {
    pub config: SimulationConfig,
    pub travel_times: TravelTimes,
    pub station_xy: HashMap<String, Node>,
    pub engine_counts: Vec<(String, u32)>,
    pub incident_rows: Vec<IncidentRow>,

    pub engines: Vec<Engine>,
    /// Station of each engine, indexed by engine id.
    pub station_mapping: Vec<String>,
    pub pending_events: VecDeque<Incident>,
    pub finished_events: Vec<Incident>,
    pub response_times: Vec<f64>,
    pub dispatch_history: Vec<DispatchRecord>,

    pub time: Time,
    pub step_count: u64,
}

impl Simulator {
    pub fn new(config: SimulationConfig, dataset: Dataset) -> Self {
        let Dataset {
            incidents,
            mut travel_times,
            station_xy,
            engine_counts,
        } = dataset;

        travel_times.patch_missing_stations(
            engine_counts.iter().map(|(station, _)| station.as_str()),
            UNREACHABLE_SECONDS,
        );

        let mut simulator = Self {
            config,
            travel_times,
            station_xy,
            engine_counts,
            incident_rows: incidents,
            engines: Vec::new(),
            station_mapping: Vec::new(),
            pending_events: VecDeque::new(),
            finished_events: Vec::new(),
            response_times: Vec::new(),
            dispatch_history: Vec::new(),
            time: 0,
            step_count: 0,
        };
        simulator.reset();
        simulator
    }

    /// Rebuilds the fleet and replays the incident table from the start.
    pub fn reset(&mut self) {
        self.time = 0;
        self.step_count = 0;
        self.response_times.clear();
        self.finished_events.clear();
        self.dispatch_history.clear();

        self.init_engines();
        self.pending_events = self.generate_events();
    }

    fn init_engines(&mut self) {
        self.engines.clear();
        self.station_mapping.clear();

        for (station, count) in &self.engine_counts {
            let home_node = self.station_xy.get(station).copied().unwrap_or_else(|| {
                log::warn!("No location for station {station}, placing its engines at (0, 0)");
                (0.0, 0.0)
            });

            for _ in 0..*count {
                let engine = Engine::new(
                    self.engines.len(),
                    home_node,
                    "PRL",
                    self.config.cooldown_seconds,
                );
                self.engines.push(engine);
                self.station_mapping.push(station.to_owned());
            }
        }
    }

    fn generate_events(&self) -> VecDeque<Incident> {
        self.incident_rows
            .iter()
            .enumerate()
            .map(|(id, row)| Incident::from_row(row, id))
            .sorted_by_key(|incident| incident.timestamp)
            .collect()
    }

    /// Moves the clock, and every engine with it, up to the call time of the
    /// next incident. No-op when the queue is empty or the clock is already there.
    pub fn advance_to_next_event(&mut self) {
        let Some(event_time) = self.pending_events.front().map(|event| event.timestamp) else {
            return;
        };
        if self.time >= event_time {
            return;
        }

        let delta = event_time - self.time;
        self.time = event_time;
        self.engines
            .iter_mut()
            .for_each(|engine| engine.advance(delta as f64));
        log::debug!("Advancing clock to {event_time} (+{delta}s)");
    }

    pub fn travel_time(&self, incident: &Incident, engine_id: EngineId) -> Option<f64> {
        let station = self.station_mapping.get(engine_id)?;
        self.travel_times.lookup(&incident.incident_index, station)
    }

    /// Dispatches `engine_ids` to the next incident.
    /// Returns the reward, whether the run is over, and the outcome.
    pub fn step(&mut self, engine_ids: &[EngineId]) -> (f64, bool, DispatchOutcome) {
        self.step_count += 1;

        if self.pending_events.is_empty() {
            return (0.0, true, DispatchOutcome::default());
        }
        self.advance_to_next_event();

        let Some(mut event) = self.pending_events.pop_front() else {
            return (0.0, true, DispatchOutcome::default());
        };
        let dispatch_count = event.required_dispatch_count();

        let mut rewards = Vec::new();
        let mut response_times = Vec::new();
        let mut used_engines = Vec::new();

        for (i, &engine_id) in engine_ids.iter().take(dispatch_count).enumerate() {
            match self.engines.get(engine_id) {
                Some(engine) if engine.is_available() => {}
                Some(_) => continue,
                None => {
                    log::warn!("Unknown engine {engine_id} requested for event {}", event.id);
                    continue;
                }
            }

            let station = self.station_mapping[engine_id].to_owned();
            let driving_seconds = self.travel_time(&event, engine_id).unwrap_or_else(|| {
                log::error!(
                    "No travel time for event {} from station {station}, assuming {UNREACHABLE_SECONDS}s",
                    event.incident_index
                );
                UNREACHABLE_SECONDS
            });
            log::debug!("Engine {engine_id} dispatched from {station} | Time: {driving_seconds:.1}s");

            self.engines[engine_id].assign_to_event(
                event.graph_node,
                driving_seconds,
                event.reaction_seconds,
                event.on_scene_seconds,
            );
            event.mark_responded(engine_id, driving_seconds);

            self.dispatch_history.push(DispatchRecord {
                event_id: event.id,
                incident_index: event.incident_index.to_owned(),
                engine_id: Some(engine_id),
                station: Some(station),
                response_time: Some(driving_seconds),
                risk_level: event.risk_level.to_owned(),
                timestamp: event.timestamp,
                dispatched_vehicle_count: (i == 0).then_some(dispatch_count),
                error: None,
            });

            rewards.push(-(driving_seconds * driving_seconds));
            response_times.push(driving_seconds);
            used_engines.push(engine_id);
        }

        if used_engines.is_empty() {
            self.dispatch_history.push(DispatchRecord {
                event_id: event.id,
                incident_index: event.incident_index.to_owned(),
                engine_id: None,
                station: None,
                response_time: None,
                risk_level: event.risk_level.to_owned(),
                timestamp: event.timestamp,
                dispatched_vehicle_count: None,
                error: Some(DispatchFailure::NoEnginesDispatched),
            });
            let outcome = DispatchOutcome {
                event_id: Some(event.id),
                error: Some(DispatchFailure::NoEnginesDispatched),
                ..Default::default()
            };
            return (FAILED_DISPATCH_REWARD, false, outcome);
        }

        self.time = self.time.max(event.timestamp);
        let outcome = DispatchOutcome {
            event_id: Some(event.id),
            dispatched_engines: used_engines,
            min_response_time: response_times.iter().copied().reduce(f64::min),
            response_times: response_times.clone(),
            error: None,
        };
        self.response_times.extend(response_times);
        self.finished_events.push(event);

        let terminated = self.step_count >= self.config.max_steps || self.pending_events.is_empty();
        let reward = rewards.iter().sum::<f64>() / rewards.len() as f64;

        (reward, terminated, outcome)
    }

    pub fn available_engines(&self) -> Vec<EngineId> {
        self.engines
            .iter()
            .filter(|engine| engine.is_available())
            .map(|engine| engine.id)
            .collect()
    }

    /// Available engines ordered for the next incident by travel time, then
    /// by how often they were used, then by id. Unknown travel times sort last.
    pub fn sorted_available_engines(&self) -> Vec<EngineId> {
        let Some(event) = self.pending_events.front() else {
            return Vec::new();
        };

        self.engines
            .iter()
            .filter(|engine| engine.is_available())
            .map(|engine| {
                let time = self.travel_time(event, engine.id).unwrap_or(f64::INFINITY);
                (engine.id, time, engine.dispatch_count)
            })
            .sorted_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then(a.2.cmp(&b.2))
                    .then(a.0.cmp(&b.0))
            })
            .map(|(id, _, _)| id)
            .collect()
    }

    pub fn render(&self) {
        log::info!("{self}");
    }
}

impl fmt::Display for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Simulator] t={}s | remaining events: {}",
            self.time,
            self.pending_events.len()
        )
    }
}

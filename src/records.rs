use serde::Deserialize;

/// One real-world incident from the dispatch-history table.
/// Every column is optional; unknown columns are ignored.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct IncidentRow {
    #[serde(default)]
    pub call_time: Option<String>,
    /// Incident location as `"(easting, northing)"`.
    #[serde(default)]
    pub graph_node: Option<String>,
    #[serde(default)]
    pub incident_profile_label: Option<String>,
    /// Driving time observed in the historical dispatch.
    #[serde(default)]
    pub driving_seconds: Option<f64>,
    #[serde(default)]
    pub prl_count: Option<f64>,
    #[serde(default)]
    pub brv_count: Option<f64>,
    #[serde(default)]
    pub reaction_seconds: Option<f64>,
    #[serde(default)]
    pub on_scene_seconds: Option<f64>,
    #[serde(default)]
    pub station_easting: Option<f64>,
    #[serde(default)]
    pub station_northing: Option<f64>,
    #[serde(default)]
    pub incident_index: Option<String>,
    #[serde(default, rename = "Incident_Number")]
    pub incident_number: Option<String>,
    #[serde(default)]
    pub dispatched_vehicle_count: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StationLocation {
    #[serde(alias = "Station", alias = "station_name")]
    pub station: String,
    #[serde(alias = "x")]
    pub easting: f64,
    #[serde(alias = "y")]
    pub northing: f64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StationEngineCount {
    #[serde(alias = "Station", alias = "station_name")]
    pub station: String,
    #[serde(alias = "engine_count", alias = "engines", alias = "Count")]
    pub count: u32,
}

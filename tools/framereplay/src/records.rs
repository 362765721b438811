//! Typed records exchanged with the fixture store.
//!
//! Every record is a JSON object. Fields the harness does not interpret are
//! kept in `extra` so a record read from a fixture and written back loses
//! nothing. Every type has a zero-value `Default`, which is what a frame gets
//! when the corresponding fixture file is absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Header ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    /// Seconds; pinned on the mock clock before the frame is processed.
    pub timestamp_sec: f64,
    pub module_name: String,
    pub sequence_num: u64,
}

// ── Geometry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub position: Point3D,
    /// Radians, counter-clockwise from east.
    pub heading: f64,
    pub linear_velocity: Point3D,
}

// ── Inputs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingResponse {
    pub header: Header,
    pub measurement_distance: f64,
    pub road: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chassis {
    pub header: Header,
    pub speed_mps: f64,
    pub throttle_percentage: f64,
    pub brake_percentage: f64,
    pub steering_percentage: f64,
    pub gear_location: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationEstimate {
    pub header: Header,
    pub pose: Pose,
    pub measurement_time: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionObstacle {
    pub id: i64,
    pub timestamp: f64,
    pub predicted_period: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionObstacles {
    pub header: Header,
    pub prediction_obstacle: Vec<PredictionObstacle>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalColor {
    #[default]
    Unknown,
    Red,
    Yellow,
    Green,
    Black,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficLight {
    pub id: String,
    pub color: SignalColor,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficLightDetection {
    pub header: Header,
    pub traffic_light: Vec<TrafficLight>,
    pub contain_lights: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Narrative/event state ("stories") published alongside the sensor channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stories {
    pub header: Header,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub v: f64,
    pub a: f64,
    pub relative_time: f64,
}

/// Planning result for one frame. Also the shape of the recorded primary file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trajectory {
    pub header: Header,
    pub total_path_length: f64,
    pub total_path_time: f64,
    pub trajectory_point: Vec<TrajectoryPoint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

//! Fixture directory layout and typed record access.
//!
//! A fixture root holds one directory per frame index (`0`, `1`, ...). Each
//! frame directory contains the recorded planning result (whose presence is
//! what makes the frame exist), a header carrying the frame timestamp, and any
//! subset of the optional input channels. The replayed output is written next
//! to them under its own name.

use crate::errors::HarnessError;
use crate::records::{
    Chassis, Header, LocalizationEstimate, PredictionObstacles, RoutingResponse, Stories,
    TrafficLightDetection,
};
use crate::runtime::FileSystem;
use crate::types::FrameIndex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PRIMARY_FILE: &str = "planning.json";
pub const DEFAULT_HEADER_FILE: &str = "header.json";
pub const DEFAULT_OUTPUT_FILE: &str = "deft.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputChannel {
    Routing,
    Chassis,
    Localization,
    Prediction,
    TrafficLight,
    Stories,
}

impl InputChannel {
    pub const ALL: [InputChannel; 6] = [
        Self::Routing,
        Self::Chassis,
        Self::Localization,
        Self::Prediction,
        Self::TrafficLight,
        Self::Stories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Chassis => "chassis",
            Self::Localization => "localization",
            Self::Prediction => "prediction",
            Self::TrafficLight => "traffic_light",
            Self::Stories => "stories",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLayout {
    pub root: PathBuf,
    pub primary_file: String,
    pub header_file: String,
    pub output_file: String,
}

impl FixtureLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            primary_file: DEFAULT_PRIMARY_FILE.to_string(),
            header_file: DEFAULT_HEADER_FILE.to_string(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
        }
    }

    pub fn frame_dir(&self, frame: FrameIndex) -> PathBuf {
        self.root.join(frame.to_string())
    }

    pub fn primary_path(&self, frame: FrameIndex) -> PathBuf {
        self.frame_dir(frame).join(&self.primary_file)
    }

    pub fn header_path(&self, frame: FrameIndex) -> PathBuf {
        self.frame_dir(frame).join(&self.header_file)
    }

    pub fn input_path(&self, frame: FrameIndex, channel: InputChannel) -> PathBuf {
        self.frame_dir(frame).join(channel.file_name())
    }

    pub fn output_path(&self, frame: FrameIndex) -> PathBuf {
        self.frame_dir(frame).join(&self.output_file)
    }
}

/// Everything the pipeline receives for one frame.
///
/// `None` means the fixture file was absent; consumers read the field through
/// the `*_or_default` accessors (or [`FrameInputs::to_local_view`]), which
/// substitute the record's zero value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInputs {
    pub header: Option<Header>,
    pub routing: Option<RoutingResponse>,
    pub chassis: Option<Chassis>,
    pub localization: Option<LocalizationEstimate>,
    pub prediction: Option<PredictionObstacles>,
    pub traffic_light: Option<TrafficLightDetection>,
    pub stories: Option<Stories>,
}

impl FrameInputs {
    /// Timestamp the mock clock is pinned to; `0.0` without a header.
    pub fn timestamp_sec(&self) -> f64 {
        self.header.as_ref().map_or(0.0, |header| header.timestamp_sec)
    }

    pub fn header_or_default(&self) -> Header {
        self.header.clone().unwrap_or_default()
    }

    pub fn chassis_or_default(&self) -> Chassis {
        self.chassis.clone().unwrap_or_default()
    }

    pub fn localization_or_default(&self) -> LocalizationEstimate {
        self.localization.clone().unwrap_or_default()
    }

    pub fn stories_or_default(&self) -> Stories {
        self.stories.clone().unwrap_or_default()
    }

    pub fn to_local_view(&self) -> LocalView {
        LocalView {
            header: self.header_or_default(),
            routing: self.routing.clone().unwrap_or_default(),
            chassis: self.chassis_or_default(),
            localization: self.localization_or_default(),
            prediction: self.prediction.clone().unwrap_or_default(),
            traffic_light: self.traffic_light.clone().unwrap_or_default(),
            stories: self.stories_or_default(),
        }
    }
}

/// Fully-defaulted snapshot of a frame's inputs, as sent to external planners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalView {
    pub header: Header,
    pub routing: RoutingResponse,
    pub chassis: Chassis,
    pub localization: LocalizationEstimate,
    pub prediction: PredictionObstacles,
    pub traffic_light: TrafficLightDetection,
    pub stories: Stories,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedFrame {
    pub inputs: FrameInputs,
    /// Optional channels that were attempted but absent on disk.
    pub missing: Vec<InputChannel>,
    pub header_missing: bool,
}

pub struct FixtureStore<'a> {
    fs: &'a dyn FileSystem,
    layout: FixtureLayout,
}

impl<'a> FixtureStore<'a> {
    pub fn new(fs: &'a dyn FileSystem, layout: FixtureLayout) -> Self {
        Self { fs, layout }
    }

    pub fn layout(&self) -> &FixtureLayout {
        &self.layout
    }

    pub fn root_exists(&self) -> bool {
        self.fs.exists(&self.layout.root)
    }

    /// Continuation probe: a frame exists iff its primary file is readable.
    pub fn frame_exists(&self, frame: FrameIndex) -> bool {
        self.fs.is_readable_file(&self.layout.primary_path(frame))
    }

    /// `Ok(None)` when the file is absent; a present file that cannot be read
    /// as text or does not parse is a `MalformedRecord` error.
    pub fn load_record<T: DeserializeOwned>(
        &self,
        frame: FrameIndex,
        path: &Path,
    ) -> Result<Option<T>, HarnessError> {
        if !self.fs.is_readable_file(path) {
            return Ok(None);
        }
        let malformed = |reason: String| HarnessError::MalformedRecord {
            frame,
            path: path.display().to_string(),
            reason,
        };
        let raw = self
            .fs
            .read_to_string(path)
            .map_err(|e| malformed(e.to_string()))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| malformed(e.to_string()))
    }

    /// Writes `value` as JSON and returns the exact text written.
    pub fn save_record<T: Serialize>(
        &self,
        frame: FrameIndex,
        path: &Path,
        value: &T,
        pretty: bool,
    ) -> Result<String, HarnessError> {
        let persist_err = |reason: String| HarnessError::Persist {
            frame,
            path: path.display().to_string(),
            reason,
        };
        let rendered = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| persist_err(e.to_string()))?;
        self.fs
            .write_string(path, &rendered)
            .map_err(|e| persist_err(e.to_string()))?;
        Ok(rendered)
    }

    pub fn load_frame(
        &self,
        frame: FrameIndex,
        load_stories: bool,
    ) -> Result<LoadedFrame, HarnessError> {
        let mut loaded = LoadedFrame::default();

        loaded.inputs.header = self.load_record(frame, &self.layout.header_path(frame))?;
        loaded.header_missing = loaded.inputs.header.is_none();

        for channel in InputChannel::ALL {
            if channel == InputChannel::Stories && !load_stories {
                continue;
            }
            let path = self.layout.input_path(frame, channel);
            let present = match channel {
                InputChannel::Routing => {
                    loaded.inputs.routing = self.load_record(frame, &path)?;
                    loaded.inputs.routing.is_some()
                }
                InputChannel::Chassis => {
                    loaded.inputs.chassis = self.load_record(frame, &path)?;
                    loaded.inputs.chassis.is_some()
                }
                InputChannel::Localization => {
                    loaded.inputs.localization = self.load_record(frame, &path)?;
                    loaded.inputs.localization.is_some()
                }
                InputChannel::Prediction => {
                    loaded.inputs.prediction = self.load_record(frame, &path)?;
                    loaded.inputs.prediction.is_some()
                }
                InputChannel::TrafficLight => {
                    loaded.inputs.traffic_light = self.load_record(frame, &path)?;
                    loaded.inputs.traffic_light.is_some()
                }
                InputChannel::Stories => {
                    loaded.inputs.stories = self.load_record(frame, &path)?;
                    loaded.inputs.stories.is_some()
                }
            };
            if !present {
                loaded.missing.push(channel);
            }
        }

        Ok(loaded)
    }
}

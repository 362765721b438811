//! Reference pipeline for harness smoke runs.
//!
//! Rolls the localized pose forward at the chassis speed along the current
//! heading. It has no planning logic worth regressing; it exists so the
//! harness can be exercised end to end without an external planner.

use crate::clock::MockClock;
use crate::config::PipelineConfig;
use crate::errors::HarnessError;
use crate::fixture::FrameInputs;
use crate::pipeline::Pipeline;
use crate::records::{Header, Trajectory, TrajectoryPoint};
use serde_json::{Map, Value};

pub const MODULE_NAME: &str = "framereplay/constant_velocity";

/// Upper bound on `horizon_sec / step_sec`, so a planned trajectory stays small.
pub const MAX_TRAJECTORY_STEPS: usize = 100_000;

#[derive(Debug, Default)]
pub struct ConstantVelocityPipeline {
    step_sec: f64,
    steps: usize,
    map_id: String,
    initialized: bool,
    sequence_num: u64,
}

impl ConstantVelocityPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_planned(&self) -> u64 {
        self.sequence_num
    }
}

impl Pipeline for ConstantVelocityPipeline {
    fn name(&self) -> &str {
        "constant_velocity"
    }

    fn initialize(&mut self, config: &PipelineConfig) -> Result<(), HarnessError> {
        let (horizon, step) = (config.horizon_sec, config.step_sec);
        if !horizon.is_finite() || !step.is_finite() || step <= 0.0 || horizon < step {
            return Err(HarnessError::InvalidConfig(format!(
                "constant_velocity needs finite 0 < step_sec <= horizon_sec, got step={step} horizon={horizon}"
            )));
        }
        let steps = (horizon / step).round();
        if steps > MAX_TRAJECTORY_STEPS as f64 {
            return Err(HarnessError::InvalidConfig(format!(
                "constant_velocity horizon_sec / step_sec is {steps}, limit is {MAX_TRAJECTORY_STEPS}"
            )));
        }
        self.steps = steps as usize;
        self.step_sec = step;
        self.map_id = config.map_id.clone();
        self.sequence_num = 0;
        self.initialized = true;
        Ok(())
    }

    fn process_frame(
        &mut self,
        inputs: &FrameInputs,
        clock: &dyn MockClock,
    ) -> Result<Trajectory, HarnessError> {
        if !self.initialized {
            return Err(HarnessError::Process(
                "constant_velocity pipeline used before initialize".to_string(),
            ));
        }

        let pose = inputs.localization_or_default().pose;
        let speed = inputs.chassis_or_default().speed_mps;
        let (sin, cos) = pose.heading.sin_cos();
        let steps = self.steps;

        let trajectory_point = (0..=steps)
            .map(|i| {
                let t = i as f64 * self.step_sec;
                TrajectoryPoint {
                    x: pose.position.x + speed * cos * t,
                    y: pose.position.y + speed * sin * t,
                    theta: pose.heading,
                    v: speed,
                    a: 0.0,
                    relative_time: t,
                }
            })
            .collect::<Vec<_>>();
        let total_path_time = steps as f64 * self.step_sec;

        let mut extra = Map::new();
        extra.insert("map_id".to_string(), Value::String(self.map_id.clone()));

        let sequence_num = self.sequence_num;
        self.sequence_num += 1;

        Ok(Trajectory {
            header: Header {
                timestamp_sec: clock.now_seconds(),
                module_name: MODULE_NAME.to_string(),
                sequence_num,
            },
            total_path_length: speed.abs() * total_path_time,
            total_path_time,
            trajectory_point,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ConstantVelocityPipeline;
    use crate::clock::{FakeMockClock, MockClock};
    use crate::config::HarnessConfig;
    use crate::errors::HarnessError;
    use crate::fixture::FrameInputs;
    use crate::pipeline::Pipeline;
    use crate::records::{Chassis, LocalizationEstimate, Point3D, Pose};

    fn initialized() -> ConstantVelocityPipeline {
        let mut cfg = HarnessConfig::default().pipeline;
        cfg.horizon_sec = 1.0;
        cfg.step_sec = 0.5;
        let mut pipeline = ConstantVelocityPipeline::new();
        pipeline.initialize(&cfg).expect("init");
        pipeline
    }

    #[test]
    fn rejects_unbounded_horizons_at_initialize() {
        let mut cfg = HarnessConfig::default().pipeline;
        cfg.horizon_sec = f64::INFINITY;
        let err = ConstantVelocityPipeline::new()
            .initialize(&cfg)
            .expect_err("infinite horizon");
        assert!(matches!(err, HarnessError::InvalidConfig(_)));

        cfg.horizon_sec = 1.0e9;
        cfg.step_sec = 1.0e-3;
        let err = ConstantVelocityPipeline::new()
            .initialize(&cfg)
            .expect_err("too many points");
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn refuses_to_plan_before_initialize() {
        let mut pipeline = ConstantVelocityPipeline::new();
        let clock = FakeMockClock::new();
        assert!(pipeline
            .process_frame(&FrameInputs::default(), &clock)
            .is_err());
    }

    #[test]
    fn rolls_pose_forward_along_heading() {
        let mut pipeline = initialized();
        let clock = FakeMockClock::new();
        clock.enable_deterministic_mode();
        clock.set_time(12.5).expect("set");
        let inputs = FrameInputs {
            chassis: Some(Chassis {
                speed_mps: 2.0,
                ..Chassis::default()
            }),
            localization: Some(LocalizationEstimate {
                pose: Pose {
                    position: Point3D {
                        x: 10.0,
                        y: -4.0,
                        z: 0.0,
                    },
                    heading: 0.0,
                    ..Pose::default()
                },
                ..LocalizationEstimate::default()
            }),
            ..FrameInputs::default()
        };

        let trajectory = pipeline.process_frame(&inputs, &clock).expect("plan");
        assert_eq!(trajectory.header.timestamp_sec, 12.5);
        assert_eq!(trajectory.trajectory_point.len(), 3);
        let last = &trajectory.trajectory_point[2];
        assert_eq!(last.x, 12.0);
        assert_eq!(last.y, -4.0);
        assert_eq!(last.relative_time, 1.0);
        assert_eq!(trajectory.total_path_length, 2.0);
    }

    #[test]
    fn missing_inputs_plan_a_stationary_trajectory_at_origin() {
        let mut pipeline = initialized();
        let clock = FakeMockClock::new();
        let trajectory = pipeline
            .process_frame(&FrameInputs::default(), &clock)
            .expect("plan");
        assert!(trajectory
            .trajectory_point
            .iter()
            .all(|p| p.x == 0.0 && p.y == 0.0 && p.v == 0.0));
        assert_eq!(trajectory.total_path_length, 0.0);
    }

    #[test]
    fn sequence_number_advances_per_frame() {
        let mut pipeline = initialized();
        let clock = FakeMockClock::new();
        let first = pipeline
            .process_frame(&FrameInputs::default(), &clock)
            .expect("first");
        let second = pipeline
            .process_frame(&FrameInputs::default(), &clock)
            .expect("second");
        assert_eq!(first.header.sequence_num, 0);
        assert_eq!(second.header.sequence_num, 1);
        assert_eq!(pipeline.frames_planned(), 2);
    }
}

//! Stage plans: how the number of virtual users changes over time

use crate::error::{LoadError, LoadResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One ramp segment: move from the previous target to `target` over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Length of the segment. Zero means an immediate jump.
    pub duration: Duration,

    /// Virtual users wanted at the end of the segment.
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Ordered, immutable ramp schedule of target concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    /// Build a plan from ramp stages. The first stage ramps up from zero.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Constant concurrency for the whole duration.
    ///
    /// Encoded as a zero-length jump to `vus` followed by a hold stage, so the
    /// interpolation rules need no special case.
    pub fn fixed(vus: u32, duration: Duration) -> Self {
        Self {
            stages: vec![Stage::new(Duration::ZERO, vus), Stage::new(duration, vus)],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest target any stage reaches.
    pub fn max_target(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Desired concurrency `C(t)` at `elapsed` since run start, linearly
    /// interpolated inside the active stage.
    ///
    /// Past the end of the plan the last target is returned.
    pub fn target_at(&self, elapsed: Duration) -> f64 {
        let mut stage_start = Duration::ZERO;
        let mut previous = 0.0_f64;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            // Zero-length stages never satisfy this and only move `previous`.
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let delta = (f64::from(stage.target) - previous) * progress;
                return previous + delta;
            }
            stage_start = stage_end;
            previous = f64::from(stage.target);
        }

        previous
    }

    /// Number of virtual users that should be live at `elapsed`: `round(C(t))`.
    pub fn desired_vus(&self, elapsed: Duration) -> usize {
        self.target_at(elapsed).round().max(0.0) as usize
    }

    /// A plan must have at least one stage, a non-zero length and a VU at
    /// some point.
    pub fn validate(&self) -> LoadResult<()> {
        if self.stages.is_empty() {
            return Err(LoadError::invalid_plan("no stages"));
        }
        if self.total_duration().is_zero() {
            return Err(LoadError::invalid_plan("total duration is zero"));
        }
        if self.max_target() == 0 {
            return Err(LoadError::invalid_plan("no stage targets a virtual user"));
        }
        Ok(())
    }

    /// Get description of this plan
    pub fn description(&self) -> String {
        if self.stages.is_empty() {
            return "empty plan".to_string();
        }
        self.stages
            .iter()
            .map(|s| format!("{:?}→{}", s.duration, s.target))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_first_stage_ramps_from_zero() {
        let plan = StagePlan::new(vec![Stage::new(secs(10), 100)]);

        assert_eq!(plan.target_at(secs(0)), 0.0);
        assert_eq!(plan.target_at(secs(5)), 50.0);
        assert_eq!(plan.desired_vus(Duration::from_millis(2_500)), 25);
        assert_eq!(plan.target_at(secs(10)), 100.0); // past the end
    }

    #[test]
    fn test_multi_stage_ramp_up_and_down() {
        let plan = StagePlan::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(secs(10), 30),
            Stage::new(secs(20), 0),
        ]);

        assert_eq!(plan.total_duration(), secs(40));
        assert_eq!(plan.max_target(), 30);
        assert_eq!(plan.target_at(secs(15)), 20.0); // halfway 10 → 30
        assert_eq!(plan.target_at(secs(30)), 15.0); // halfway 30 → 0
        assert_eq!(plan.desired_vus(secs(38)), 3);
        assert_eq!(plan.desired_vus(Duration::from_millis(39_900)), 0); // 0.15
    }

    #[test]
    fn test_fixed_plan_is_constant() {
        let plan = StagePlan::fixed(50, secs(60));

        assert_eq!(plan.total_duration(), secs(60));
        assert_eq!(plan.desired_vus(secs(0)), 50);
        assert_eq!(plan.desired_vus(secs(30)), 50);
        assert_eq!(plan.desired_vus(Duration::from_millis(59_999)), 50);
    }

    #[test]
    fn test_zero_duration_stage_jumps() {
        let plan = StagePlan::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(Duration::ZERO, 40),
            Stage::new(secs(10), 40),
        ]);

        assert_eq!(plan.desired_vus(Duration::from_millis(9_900)), 10);
        assert_eq!(plan.desired_vus(secs(10)), 40);
        assert_eq!(plan.desired_vus(secs(15)), 40);
    }

    #[test]
    fn test_zero_target_stage_is_idle_window() {
        let plan = StagePlan::new(vec![
            Stage::new(Duration::ZERO, 0),
            Stage::new(secs(30), 0),
            Stage::new(secs(10), 10),
        ]);

        assert_eq!(plan.desired_vus(secs(0)), 0);
        assert_eq!(plan.desired_vus(secs(29)), 0);
        assert_eq!(plan.desired_vus(secs(35)), 5);
    }

    #[test]
    fn test_empty_plan() {
        let plan = StagePlan::new(Vec::new());

        assert_eq!(plan.total_duration(), Duration::ZERO);
        assert_eq!(plan.desired_vus(secs(1)), 0);
        assert_eq!(plan.description(), "empty plan");
    }

    #[test]
    fn test_validate() {
        assert!(StagePlan::fixed(1, secs(1)).validate().is_ok());
        assert!(StagePlan::new(vec![Stage::new(secs(5), 0), Stage::new(secs(5), 3)])
            .validate()
            .is_ok());

        for plan in [
            StagePlan::new(Vec::new()),
            StagePlan::fixed(5, Duration::ZERO),
            StagePlan::fixed(0, secs(10)),
        ] {
            assert!(
                matches!(plan.validate(), Err(LoadError::InvalidPlan { .. })),
                "{}",
                plan.description()
            );
        }
    }
}

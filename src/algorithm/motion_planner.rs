//! Splits a relative displacement into timed sub-moves with an
//! accelerate / cruise / decelerate speed profile.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MIN_PLANNED_STEPS: usize = 3;
pub const MAX_PLANNED_STEPS: usize = 15;
/// Distance covered per planned step before clamping to the step bounds.
const DISTANCE_PER_STEP: f64 = 1.5;
/// Speed factor at the very start of the acceleration phase.
const MIN_SPEED_FACTOR: f64 = 0.2;
/// Speed factor reached at the end of the deceleration phase.
const END_SPEED_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionConfig {
    /// Displacements up to this length are sent as a single step.
    pub min_step_size: f64,
    /// Largest magnitude of one profile step, in device units.
    pub max_step_size: f64,
    pub base_delay_s: f64,
    pub min_delay_s: f64,
    pub max_delay_s: f64,
    pub accel_ratio: f64,
    pub steady_ratio: f64,
    /// Path jitter amplitude relative to the mean step length.
    pub path_randomness: f64,
    /// Relative timing jitter applied to every delay.
    pub timing_randomness: f64,
    /// Path jitter is only applied to displacements longer than this.
    pub jitter_min_distance: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_step_size: 1.0,
            max_step_size: 127.0,
            base_delay_s: 0.004,
            min_delay_s: 0.003,
            max_delay_s: 0.025,
            accel_ratio: 0.2,
            steady_ratio: 0.1,
            path_randomness: 0.02,
            timing_randomness: 0.05,
            jitter_min_distance: 10.0,
        }
    }
}

impl MotionConfig {
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let finite_or = |value: f64, fallback: f64| if value.is_finite() { value } else { fallback };

        let min_delay_s = finite_or(self.min_delay_s, defaults.min_delay_s).max(0.000_1);
        let max_delay_s = finite_or(self.max_delay_s, defaults.max_delay_s).max(min_delay_s);
        let base_delay_s =
            finite_or(self.base_delay_s, defaults.base_delay_s).clamp(min_delay_s, max_delay_s);
        let accel_ratio = finite_or(self.accel_ratio, defaults.accel_ratio).clamp(0.01, 0.9);
        let steady_ratio =
            finite_or(self.steady_ratio, defaults.steady_ratio).clamp(0.0, 0.99 - accel_ratio);

        Self {
            min_step_size: finite_or(self.min_step_size, defaults.min_step_size).max(0.0),
            max_step_size: finite_or(self.max_step_size, defaults.max_step_size).max(1.0),
            base_delay_s,
            min_delay_s,
            max_delay_s,
            accel_ratio,
            steady_ratio,
            path_randomness: finite_or(self.path_randomness, defaults.path_randomness).max(0.0),
            timing_randomness: finite_or(self.timing_randomness, defaults.timing_randomness)
                .clamp(0.0, 0.9),
            jitter_min_distance: finite_or(self.jitter_min_distance, defaults.jitter_min_distance),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionStep {
    pub dx: i32,
    pub dy: i32,
    /// Pause after this step is sent.
    pub delay_s: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionPlan {
    pub steps: Vec<MotionStep>,
}

impl MotionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all step deltas.
    pub fn total(&self) -> (i64, i64) {
        self.steps.iter().fold((0i64, 0i64), |(x, y), step| {
            (x + step.dx as i64, y + step.dy as i64)
        })
    }

    pub fn total_delay_s(&self) -> f64 {
        self.steps.iter().map(|step| step.delay_s).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MotionStep> {
        self.steps.iter()
    }
}

impl IntoIterator for MotionPlan {
    type Item = MotionStep;
    type IntoIter = std::vec::IntoIter<MotionStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionStats {
    pub total_distance: f64,
    pub total_steps: usize,
    pub total_time_s: f64,
    /// Units per second; zero when the plan takes no time.
    pub average_speed: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MotionPlanner {
    config: MotionConfig,
}

impl MotionPlanner {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn plan(&self, dx: i32, dy: i32) -> MotionPlan {
        self.plan_with_rng(dx, dy, &mut rand::thread_rng())
    }

    /// Plans with a caller-supplied random source.
    pub fn plan_with_rng<R: Rng>(&self, dx: i32, dy: i32, rng: &mut R) -> MotionPlan {
        let cfg = &self.config;
        let (target_x, target_y) = (dx as f64, dy as f64);
        let total_distance = target_x.hypot(target_y);

        if total_distance <= cfg.min_step_size {
            return MotionPlan {
                steps: vec![MotionStep {
                    dx,
                    dy,
                    delay_s: cfg.base_delay_s,
                }],
            };
        }

        let steps = planned_step_count(total_distance);
        let speed_factors: Vec<f64> = (1..=steps)
            .map(|i| self.speed_factor(i as f64 / steps as f64))
            .collect();
        let weight_total: f64 = speed_factors.iter().sum();

        let jitter_amplitude = if total_distance > cfg.jitter_min_distance {
            cfg.path_randomness * (total_distance / steps as f64).min(2.0)
        } else {
            0.0
        };

        let mut plan = Vec::with_capacity(steps + 1);
        let mut covered_weight = 0.0;
        let mut accumulated = (0i64, 0i64);

        for (index, &speed) in speed_factors.iter().enumerate() {
            covered_weight += speed;
            let is_last = index + 1 == steps;
            let progress = if is_last {
                1.0
            } else {
                covered_weight / weight_total
            };

            let mut want_x = target_x * progress;
            let mut want_y = target_y * progress;
            if index > 0 && !is_last && jitter_amplitude > 0.0 {
                want_x += rng.gen_range(-jitter_amplitude..=jitter_amplitude);
                want_y += rng.gen_range(-jitter_amplitude..=jitter_amplitude);
            }

            let mut step_x = want_x - accumulated.0 as f64;
            let mut step_y = want_y - accumulated.1 as f64;
            let step_len = step_x.hypot(step_y);
            if step_len > cfg.max_step_size {
                let scale = cfg.max_step_size / step_len;
                step_x *= scale;
                step_y *= scale;
            }

            let step_x = step_x.round() as i32;
            let step_y = step_y.round() as i32;
            if step_x == 0 && step_y == 0 {
                continue;
            }

            plan.push(MotionStep {
                dx: step_x,
                dy: step_y,
                delay_s: self.step_delay(speed, rng),
            });
            accumulated.0 += step_x as i64;
            accumulated.1 += step_y as i64;
        }

        let residual_x = dx as i64 - accumulated.0;
        let residual_y = dy as i64 - accumulated.1;
        if residual_x != 0 || residual_y != 0 {
            log::trace!("plan: corrective step ({residual_x}, {residual_y})");
            plan.push(MotionStep {
                dx: residual_x as i32,
                dy: residual_y as i32,
                delay_s: cfg.base_delay_s,
            });
        }

        MotionPlan { steps: plan }
    }

    /// Three-phase profile over `progress` in `[0, 1]`.
    pub fn speed_factor(&self, progress: f64) -> f64 {
        let accel = self.config.accel_ratio;
        let steady_end = accel + self.config.steady_ratio;
        let progress = progress.clamp(0.0, 1.0);

        if progress <= accel {
            let t = progress / accel;
            MIN_SPEED_FACTOR + (1.0 - MIN_SPEED_FACTOR) * t * t
        } else if progress <= steady_end {
            1.0
        } else {
            let t = (progress - steady_end) / (1.0 - steady_end);
            1.0 - (1.0 - END_SPEED_FACTOR) * t * t
        }
    }

    pub fn stats(&self, dx: i32, dy: i32) -> MotionStats {
        let plan = self.plan(dx, dy);
        let total_distance = (dx as f64).hypot(dy as f64);
        let total_time_s = plan.total_delay_s();
        MotionStats {
            total_distance,
            total_steps: plan.len(),
            total_time_s,
            average_speed: if total_time_s > 0.0 {
                total_distance / total_time_s
            } else {
                0.0
            },
        }
    }

    fn step_delay<R: Rng>(&self, speed_factor: f64, rng: &mut R) -> f64 {
        let cfg = &self.config;
        // 0 at full speed, 1 at the slowest point of the profile.
        let stretch = ((1.0 / speed_factor.max(MIN_SPEED_FACTOR)) - 1.0)
            / ((1.0 / MIN_SPEED_FACTOR) - 1.0);
        let delay = cfg.base_delay_s + (cfg.max_delay_s - cfg.base_delay_s) * stretch;

        let jitter = if cfg.timing_randomness > 0.0 {
            rng.gen_range(-cfg.timing_randomness..=cfg.timing_randomness)
        } else {
            0.0
        };
        (delay * (1.0 + jitter)).clamp(cfg.min_delay_s, cfg.max_delay_s)
    }
}

fn planned_step_count(distance: f64) -> usize {
    ((distance / DISTANCE_PER_STEP).round() as usize).clamp(MIN_PLANNED_STEPS, MAX_PLANNED_STEPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn planner() -> MotionPlanner {
        MotionPlanner::default()
    }

    #[test]
    fn tiny_move_is_a_single_step_at_base_delay() {
        let plan = planner().plan(1, 0);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].dx, 1);
        assert_eq!(plan.steps[0].delay_s, MotionConfig::default().base_delay_s);

        let still = planner().plan(0, 0);
        assert_eq!(still.total(), (0, 0));
        assert_eq!(still.len(), 1);
    }

    #[test]
    fn long_horizontal_move_follows_profile() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = planner().plan_with_rng(200, 0, &mut rng);

        assert!(plan.len() >= MIN_PLANNED_STEPS && plan.len() <= MAX_PLANNED_STEPS);
        assert_eq!(plan.total(), (200, 0));

        let first = plan.steps[0].dx;
        let steady_peak = plan.steps[1..plan.len() / 2]
            .iter()
            .map(|step| step.dx)
            .max()
            .expect("steady steps");
        assert!(first < steady_peak, "first {first} vs steady {steady_peak}");
        assert!(plan.steps.iter().all(|step| step.dy == 0));
    }

    #[test]
    fn delays_are_positive_and_bounded() {
        let cfg = MotionConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        for (dx, dy) in [(200, 0), (-40, 33), (5, -5), (0, 127)] {
            let plan = planner().plan_with_rng(dx, dy, &mut rng);
            for step in plan.iter() {
                assert!(step.delay_s > 0.0);
                assert!(step.delay_s >= cfg.min_delay_s - 1e-12);
                assert!(step.delay_s <= cfg.max_delay_s + 1e-12);
            }
        }
    }

    #[test]
    fn steady_phase_is_fastest() {
        let planner = planner();
        assert!((planner.speed_factor(0.0) - 0.2).abs() < 1e-12);
        assert!((planner.speed_factor(0.2) - 1.0).abs() < 1e-12);
        assert_eq!(planner.speed_factor(0.25), 1.0);
        assert!((planner.speed_factor(1.0) - 0.5).abs() < 1e-12);
        assert!(planner.speed_factor(0.1) < planner.speed_factor(0.2));
        assert!(planner.speed_factor(0.9) < planner.speed_factor(0.3));
    }

    #[test]
    fn step_clamping_is_repaired_by_corrective_step() {
        let planner = MotionPlanner::new(MotionConfig {
            max_step_size: 2.0,
            ..MotionConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(3);
        let plan = planner.plan_with_rng(50, -20, &mut rng);

        assert_eq!(plan.total(), (50, -20));
        let (before_last, last) = plan.steps.split_at(plan.len() - 1);
        assert!(before_last
            .iter()
            .all(|step| (step.dx as f64).hypot(step.dy as f64) <= 2.0 + 0.75));
        assert_eq!(last[0].delay_s, planner.config().base_delay_s);
    }

    #[test]
    fn stats_summarize_plan() {
        let stats = planner().stats(30, 40);
        assert_eq!(stats.total_distance, 50.0);
        assert!(stats.total_steps >= 1);
        assert!(stats.total_time_s > 0.0);
        assert!(stats.average_speed > 0.0);
    }

    #[test]
    fn normalized_config_orders_delay_bounds() {
        let cfg = MotionConfig {
            base_delay_s: 0.1,
            min_delay_s: 0.05,
            max_delay_s: 0.01,
            ..MotionConfig::default()
        }
        .normalized();
        assert!(cfg.min_delay_s <= cfg.base_delay_s);
        assert!(cfg.base_delay_s <= cfg.max_delay_s);
    }

    proptest! {
        #[test]
        fn plan_sums_exactly_to_displacement(dx in -127i32..=127, dy in -127i32..=127, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = MotionPlanner::default().plan_with_rng(dx, dy, &mut rng);
            prop_assert_eq!(plan.total(), (dx as i64, dy as i64));
            prop_assert!(plan.len() <= MAX_PLANNED_STEPS + 1);
            prop_assert!(plan.iter().all(|step| step.delay_s > 0.0));
        }
    }
}

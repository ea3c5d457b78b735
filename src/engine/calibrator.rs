use std::collections::BTreeMap;

use super::Phase;
use crate::pose::{PointId, PointSet};
use crate::spec::{DynamicVarSpec, MeasureKind};

/// Smallest value a baseline is ever divided by
pub const MIN_BASELINE: f32 = 1.0;

/// Baseline snaps to the first measurement above this while still unset
const BOOTSTRAP_MIN_MEASUREMENT: f32 = 10.0;

/// Slowly-adapting scalar baseline
///
/// Every accepted measurement decays the stored value a little; upward blending only
/// happens while calibrating, so a one-frame spike moves it by at most `damping` of the gap.
#[derive(Debug, Clone)]
pub struct Baseline {
    value: f32,
    decay: f32,
    damping: f32,
}

impl Baseline {
    pub fn new(decay: f32, damping: f32) -> Self {
        Self {
            value: 0.0,
            decay,
            damping,
        }
    }

    pub fn update(&mut self, measured: f32, calibrating: bool) {
        // missing measurement: skip the frame entirely, decay included
        if !(measured > 0.0) {
            return;
        }

        if self.value < MIN_BASELINE {
            if measured > BOOTSTRAP_MIN_MEASUREMENT {
                self.value = measured;
            }
            return;
        }

        self.value *= self.decay;

        if calibrating && measured > self.value {
            self.value = self.value * (1.0 - self.damping) + measured * self.damping;
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn ratio(&self, value: f32) -> f32 {
        value / self.value.max(MIN_BASELINE)
    }
}

/// Two-point measurement in pixels
pub fn measure(kind: MeasureKind, points: &PointSet, pair: &[PointId; 2]) -> Option<f32> {
    let (a, b) = points.get_pair(pair)?;
    Some(match kind {
        MeasureKind::DistanceY => (a.y - b.y).abs(),
        MeasureKind::DistanceX => (a.x - b.x).abs(),
        MeasureKind::Distance => a.distance(b),
    })
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub measure: MeasureKind,
    pub points: [PointId; 2],
    pub active_state: Phase,
    pub baseline: Baseline,
}

/// Named baselines declared by an exercise document
#[derive(Debug, Clone, Default)]
pub struct DynamicCalibrator {
    vars: BTreeMap<String, Variable>,
}

impl DynamicCalibrator {
    pub fn new(specs: &[DynamicVarSpec]) -> Self {
        let vars = specs
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    Variable {
                        measure: spec.source_type,
                        points: spec.points,
                        active_state: spec.active_state,
                        baseline: Baseline::new(spec.decay, spec.damping),
                    },
                )
            })
            .collect();
        Self { vars }
    }

    /// Feed one measurement; unknown names are ignored
    pub fn update(&mut self, name: &str, measured: f32, is_calibration_phase: bool) {
        if let Some(var) = self.vars.get_mut(name) {
            var.baseline.update(measured, is_calibration_phase);
        }
    }

    /// Measure every variable from the frame and update it for the given phase
    pub fn update_from_frame(&mut self, points: &PointSet, phase: Phase) {
        for var in self.vars.values_mut() {
            let measured = measure(var.measure, points, &var.points).unwrap_or(0.0);
            var.baseline.update(measured, phase == var.active_state);
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Current baseline, or 0.0 for an undeclared name
    pub fn baseline(&self, name: &str) -> f32 {
        self.vars.get(name).map_or(0.0, |v| v.baseline.value())
    }

    pub fn get_ratio(&self, name: &str, value: f32) -> f32 {
        value / self.baseline(name).max(MIN_BASELINE)
    }
}

use super::calibrator::Baseline;
use super::Phase;
use crate::config::SpineConfig;
use crate::geometry::Point;
use crate::pose::{Anchor, Joint, PointId, PointSet};

/// Torso shorter than this is treated as degenerate
const MIN_TORSO_LEN: f32 = 1e-6;

/// Nose-offset score fed into the facing EMA
const FACING_SCORE: f32 = 2.5;

/// Per-frame spine analysis result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpineReading {
    /// 1 - length / baseline, clamped at 0
    pub compression: f32,
    /// Compression left after the hinge and camera-pitch allowances
    pub effective_compression: f32,
    /// Torso axis angle from vertical (degrees)
    pub inclination_deg: f32,
    /// Positive: rounding; negative: extension
    pub rounding_force: f32,
    pub fault: bool,
}

/// Estimates thoracic/lumbar points from shoulder-hip geometry
///
/// A foreshortened torso is only read as rounding once the torso is hinged past
/// `hinge_angle_deg`; near upright the same compression renders as extension and is
/// never flagged.
#[derive(Debug, Clone)]
pub struct SpineEstimator {
    config: SpineConfig,
    torso_baseline: Baseline,
    facing: f32,
}

impl SpineEstimator {
    pub fn new(config: &SpineConfig) -> Self {
        Self {
            config: config.clone(),
            torso_baseline: Baseline::new(config.baseline_decay, config.baseline_damping),
            facing: 0.0,
        }
    }

    pub fn torso_baseline(&self) -> f32 {
        self.torso_baseline.value()
    }

    /// Writes the neck, hip-center, thorax and waist anchors into `points`
    ///
    /// Returns `None` (and writes nothing) when a shoulder or hip is missing.
    pub fn analyze(&mut self, points: &mut PointSet, phase: Phase) -> Option<SpineReading> {
        let ls = points.joint(Joint::LeftShoulder)?;
        let rs = points.joint(Joint::RightShoulder)?;
        let lh = points.joint(Joint::LeftHip)?;
        let rh = points.joint(Joint::RightHip)?;
        let cfg = &self.config;

        let neck = ls.lerp(rs, 0.5);
        let hip = lh.lerp(rh, 0.5);
        let vec = hip - neck;
        let len = vec.length();

        // loaded frames leave the torso baseline alone, decay included
        if phase == Phase::Start {
            self.torso_baseline.update(len, true);
        }
        let compression = (1.0 - self.torso_baseline.ratio(len)).max(0.0);

        let score = points
            .joint(Joint::Nose)
            .map_or(0.0, |nose| sign(nose.x - neck.x) * FACING_SCORE);
        self.facing = self.facing * 0.95 + score * 0.05;
        let face_dir = if self.facing > 0.0 { 1.0 } else { -1.0 };

        if len < MIN_TORSO_LEN {
            return None;
        }

        let u = vec * (1.0 / len);
        let normal = Point::new(-u.y, u.x);
        let back = normal * (face_dir * cfg.direction_flip);

        let inclination_deg = vec.x.atan2(vec.y).to_degrees().abs();

        let hinge_tolerance = (inclination_deg / 90.0).min(1.0) * cfg.hinge_tolerance_gain;
        let pitch_tolerance = if inclination_deg < cfg.pitch_tolerance_max_deg {
            cfg.camera_pitch_tolerance
        } else {
            0.0
        };
        let effective_compression = (compression - hinge_tolerance - pitch_tolerance).max(0.0);

        let hinged = inclination_deg > cfg.hinge_angle_deg;
        let rounding_force = if hinged {
            effective_compression * cfg.rounding_gain
        } else {
            -compression * cfg.extension_gain
        };

        let lateral = (rs.distance(rh) - ls.distance(lh)) * cfg.lateral_gain;
        let lateral_vec = normal * lateral;
        let sagittal = back * (rounding_force * len);

        let thorax = neck + vec * cfg.thorax_location + lateral_vec + sagittal;
        let waist = neck
            + vec * cfg.lumbar_location
            + lateral_vec
            + sagittal * cfg.lumbar_sagittal_factor;

        points.insert(PointId::Anchor(Anchor::Neck), neck);
        points.insert(PointId::Anchor(Anchor::HipCenter), hip);
        points.insert(PointId::Anchor(Anchor::Thorax), thorax);
        points.insert(PointId::Anchor(Anchor::Waist), waist);

        Some(SpineReading {
            compression,
            effective_compression,
            inclination_deg,
            rounding_force,
            fault: hinged && effective_compression > cfg.rounding_threshold,
        })
    }
}

fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::KeypointFrame;

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    /// Torso whose axis leans `angle_deg` from vertical, measured neck to hip
    fn make_torso(angle_deg: f32, len: f32) -> KeypointFrame {
        let neck = Point::new(300.0, 100.0);
        let rad = angle_deg.to_radians();
        let hip = neck + Point::new(rad.sin(), rad.cos()) * len;
        KeypointFrame::new()
            .with(Joint::Nose, neck.offset(20.0, -40.0))
            .with(Joint::LeftShoulder, neck.offset(-50.0, 0.0))
            .with(Joint::RightShoulder, neck.offset(50.0, 0.0))
            .with(Joint::LeftHip, hip.offset(-40.0, 0.0))
            .with(Joint::RightHip, hip.offset(40.0, 0.0))
    }

    fn calibrate(estimator: &mut SpineEstimator, len: f32) {
        for _ in 0..30 {
            let mut points = PointSet::from_frame(&make_torso(0.0, len));
            estimator.analyze(&mut points, Phase::Start);
        }
    }

    #[test]
    fn test_upright_at_baseline_never_faults() {
        for threshold in [0.0, 0.01, 0.06, 0.5] {
            let config = SpineConfig {
                rounding_threshold: threshold,
                ..SpineConfig::default()
            };
            let mut estimator = SpineEstimator::new(&config);
            calibrate(&mut estimator, 200.0);

            let len = estimator.torso_baseline();
            for phase in [Phase::Start, Phase::Active] {
                let mut points = PointSet::from_frame(&make_torso(0.0, len));
                let reading = estimator.analyze(&mut points, phase).unwrap();
                assert!(approx_eq(reading.inclination_deg, 0.0, 1e-3));
                assert!(!reading.fault, "threshold {} faulted", threshold);
            }
        }
    }

    #[test]
    fn test_baseline_holds_through_long_active_phase() {
        let mut estimator = SpineEstimator::new(&SpineConfig::default());
        calibrate(&mut estimator, 200.0);
        let baseline = estimator.torso_baseline();

        let mut points = PointSet::from_frame(&make_torso(30.0, 180.0));
        let first = estimator.analyze(&mut points, Phase::Active).unwrap().compression;
        for _ in 0..600 {
            let mut points = PointSet::from_frame(&make_torso(30.0, 180.0));
            let reading = estimator.analyze(&mut points, Phase::Active).unwrap();
            assert!(approx_eq(reading.compression, first, 1e-6));
        }
        assert_eq!(estimator.torso_baseline(), baseline);

        // a shorter standing torso only decays it
        let mut points = PointSet::from_frame(&make_torso(0.0, 150.0));
        estimator.analyze(&mut points, Phase::Start);
        assert!(estimator.torso_baseline() < baseline);
    }

    #[test]
    fn test_hinged_and_compressed_faults() {
        let mut estimator = SpineEstimator::new(&SpineConfig::default());
        calibrate(&mut estimator, 200.0);

        let mut points = PointSet::from_frame(&make_torso(45.0, 100.0));
        let reading = estimator.analyze(&mut points, Phase::Active).unwrap();

        assert!(approx_eq(reading.inclination_deg, 45.0, 0.01));
        assert!(reading.compression > 0.45);
        assert!(reading.rounding_force > 0.0);
        assert!(reading.fault);
    }

    #[test]
    fn test_hinged_without_compression_is_fine() {
        let mut estimator = SpineEstimator::new(&SpineConfig::default());
        calibrate(&mut estimator, 200.0);

        let len = estimator.torso_baseline();
        let mut points = PointSet::from_frame(&make_torso(45.0, len));
        let reading = estimator.analyze(&mut points, Phase::Active).unwrap();
        assert!(!reading.fault);
    }

    #[test]
    fn test_upright_compression_reads_as_extension() {
        let mut estimator = SpineEstimator::new(&SpineConfig::default());
        calibrate(&mut estimator, 200.0);

        let mut points = PointSet::from_frame(&make_torso(5.0, 120.0));
        let reading = estimator.analyze(&mut points, Phase::Active).unwrap();
        assert!(reading.rounding_force < 0.0);
        assert!(!reading.fault);
    }

    #[test]
    fn test_anchors_written() {
        let mut estimator = SpineEstimator::new(&SpineConfig::default());
        let mut points = PointSet::from_frame(&make_torso(0.0, 200.0));
        estimator.analyze(&mut points, Phase::Start).unwrap();

        let neck = points.get(PointId::Anchor(Anchor::Neck)).unwrap();
        let hip = points.get(PointId::Anchor(Anchor::HipCenter)).unwrap();
        let thorax = points.get(PointId::Anchor(Anchor::Thorax)).unwrap();
        let waist = points.get(PointId::Anchor(Anchor::Waist)).unwrap();

        assert_eq!(neck, Point::new(300.0, 100.0));
        assert!(approx_eq(hip.y, 300.0, 1e-3));
        // symmetric torso at its own baseline: no lateral or sagittal shift
        assert!(approx_eq(thorax.x, 300.0, 1e-3));
        assert!(approx_eq(thorax.y, 100.0 + 200.0 * 0.33, 1e-2));
        assert!(approx_eq(waist.y, 100.0 + 200.0 * 0.66, 1e-2));
    }

    #[test]
    fn test_missing_hip_writes_nothing() {
        let mut estimator = SpineEstimator::new(&SpineConfig::default());
        let mut frame = make_torso(0.0, 200.0);
        frame.remove(Joint::RightHip);
        let mut points = PointSet::from_frame(&frame);

        assert!(estimator.analyze(&mut points, Phase::Start).is_none());
        assert!(!points.contains(PointId::Anchor(Anchor::Neck)));
        assert!(!points.contains(PointId::Anchor(Anchor::Thorax)));
    }
}

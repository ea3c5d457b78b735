use super::calibrator::{measure, DynamicCalibrator};
use crate::geometry::vertex_angle;
use crate::pose::{PointId, PointSet};
use crate::spec::{MeasureKind, MetricSpec, DEFAULT_BASELINE_VAR};

/// Pair used by `compression_ratio` when neither the metric nor its baseline names one
const FALLBACK_PAIR: [PointId; 2] = [PointId::Virtual(101), PointId::Virtual(102)];

/// Everything a metric or check may read for the current frame
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub points: &'a PointSet,
    pub calibrator: &'a DynamicCalibrator,
    pub spine_fault: bool,
}

/// Evaluates a metric; missing inputs yield 0.0
pub fn evaluate(metric: &MetricSpec, ctx: &FrameContext<'_>) -> f32 {
    match metric {
        MetricSpec::CompressionRatio { points, baseline } => {
            let name = baseline.as_deref().unwrap_or(DEFAULT_BASELINE_VAR);
            let var = ctx.calibrator.variable(name);
            let pair = points
                .or_else(|| var.map(|v| v.points))
                .unwrap_or(FALLBACK_PAIR);
            let kind = var.map_or(MeasureKind::DistanceY, |v| v.measure);
            let dist = measure(kind, ctx.points, &pair).unwrap_or(0.0);
            ctx.calibrator.get_ratio(name, dist)
        }
        MetricSpec::VerticalDiff { points } => ctx
            .points
            .get_pair(points)
            .map_or(0.0, |(a, b)| a.y - b.y),
        MetricSpec::Angle { points } => ctx
            .points
            .get_all(points)
            .map_or(0.0, |p| vertex_angle(p[0], p[1], p[2])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::pose::{Joint, KeypointFrame};
    use crate::spec::DynamicVarSpec;

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn metric(json: &str) -> MetricSpec {
        serde_json::from_str(json).unwrap()
    }

    fn make_points() -> PointSet {
        let frame = KeypointFrame::new()
            .with(Joint::RightShoulder, Point::new(200.0, 100.0))
            .with(Joint::RightElbow, Point::new(200.0, 200.0))
            .with(Joint::RightWrist, Point::new(300.0, 200.0))
            .with(Joint::RightHip, Point::new(200.0, 300.0));
        let mut points = PointSet::from_frame(&frame);
        points.insert(PointId::Virtual(101), Point::new(0.0, 100.0));
        points.insert(PointId::Virtual(102), Point::new(0.0, 250.0));
        points
    }

    fn make_calibrator(json: &str, standing: f32) -> DynamicCalibrator {
        let spec: DynamicVarSpec = serde_json::from_str(json).unwrap();
        let mut cal = DynamicCalibrator::new(&[spec.clone()]);
        cal.update(&spec.name, standing, true);
        cal
    }

    #[test]
    fn test_vertical_diff_is_signed() {
        let points = make_points();
        let cal = DynamicCalibrator::default();
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };

        let m = metric(r#"{"metric": "vertical_diff", "points": [24, 12]}"#);
        assert_eq!(evaluate(&m, &ctx), 200.0);
        let m = metric(r#"{"metric": "vertical_diff", "points": [12, 24]}"#);
        assert_eq!(evaluate(&m, &ctx), -200.0);
    }

    #[test]
    fn test_angle() {
        let points = make_points();
        let cal = DynamicCalibrator::default();
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };

        let m = metric(r#"{"metric": "angle", "points": [12, 14, 16]}"#);
        assert!(approx_eq(evaluate(&m, &ctx), 90.0, 1e-3));
    }

    #[test]
    fn test_missing_points_yield_zero() {
        let points = make_points();
        let cal = DynamicCalibrator::default();
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };

        let m = metric(r#"{"metric": "angle", "points": [11, 13, 15]}"#);
        assert_eq!(evaluate(&m, &ctx), 0.0);
        let m = metric(r#"{"metric": "vertical_diff", "points": [0, 12]}"#);
        assert_eq!(evaluate(&m, &ctx), 0.0);
    }

    #[test]
    fn test_compression_ratio_uses_variable_pair() {
        let points = make_points();
        let cal = make_calibrator(
            r#"{"name": "standing_baseline", "points": [12, 24]}"#,
            200.0,
        );
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };

        let m = metric(r#"{"metric": "compression_ratio"}"#);
        assert!(approx_eq(evaluate(&m, &ctx), 1.0, 1e-4));
    }

    #[test]
    fn test_compression_ratio_explicit_points() {
        let points = make_points();
        let cal = make_calibrator(
            r#"{"name": "standing_baseline", "points": [12, 24]}"#,
            200.0,
        );
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };

        let m = metric(r#"{"metric": "compression_ratio", "points": [101, 102]}"#);
        assert!(approx_eq(evaluate(&m, &ctx), 0.75, 1e-4));
    }

    #[test]
    fn test_compression_ratio_fallback_pair_and_floor() {
        let points = make_points();
        let cal = DynamicCalibrator::default();
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };

        // no variable: pair 101/102 over a floored baseline of 1.0
        let m = metric(r#"{"metric": "compression_ratio"}"#);
        assert_eq!(evaluate(&m, &ctx), 150.0);
    }
}

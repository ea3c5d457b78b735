use crate::geometry::Point;
use crate::pose::{PointId, PointSet};
use crate::spec::{VirtualCalc, VirtualPointSpec};

/// Derives virtual points in declaration order
///
/// Sources were checked at load time to only name earlier virtual points, so a single
/// forward pass resolves every chain. Points whose sources are missing are simply absent.
#[derive(Debug, Clone, Default)]
pub struct VirtualPointResolver {
    specs: Vec<VirtualPointSpec>,
}

impl VirtualPointResolver {
    pub fn new(specs: &[VirtualPointSpec]) -> Self {
        Self {
            specs: specs.to_vec(),
        }
    }

    pub fn resolve(&self, points: &mut PointSet) {
        for spec in &self.specs {
            if let Some(point) = compute(&spec.calc, points) {
                points.insert(PointId::Virtual(spec.id), point);
            }
        }
    }
}

fn compute(calc: &VirtualCalc, points: &PointSet) -> Option<Point> {
    match calc {
        VirtualCalc::Midpoint { sources } => Point::centroid(&points.get_all(sources)?),
        VirtualCalc::ProjectionVertical { source, offset_y } => {
            Some(points.get(*source)?.offset(0.0, *offset_y))
        }
        VirtualCalc::Offset {
            source,
            offset_x,
            offset_y,
        } => Some(points.get(*source)?.offset(*offset_x, *offset_y)),
        VirtualCalc::Compose { source_x, source_y } => {
            let px = points.get(*source_x)?;
            let py = points.get(*source_y)?;
            Some(Point::new(px.x, py.y))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Joint, KeypointFrame};

    fn make_resolver(json: &str) -> VirtualPointResolver {
        let specs: Vec<VirtualPointSpec> = serde_json::from_str(json).unwrap();
        VirtualPointResolver::new(&specs)
    }

    fn make_frame() -> KeypointFrame {
        KeypointFrame::new()
            .with(Joint::LeftShoulder, Point::new(100.0, 100.0))
            .with(Joint::RightShoulder, Point::new(200.0, 100.0))
            .with(Joint::LeftHip, Point::new(110.0, 300.0))
            .with(Joint::RightHip, Point::new(190.0, 300.0))
            .with(Joint::LeftAnkle, Point::new(120.0, 600.0))
    }

    #[test]
    fn test_chain_resolves_in_order() {
        let resolver = make_resolver(
            r#"[
                {"id": 101, "calc": "midpoint", "sources": [11, 12]},
                {"id": 102, "calc": "midpoint", "sources": [23, 24]},
                {"id": 103, "calc": "projection_vertical", "source": 102, "offset_y": 40},
                {"id": 104, "calc": "offset", "source": 101, "offset_x": -10, "offset_y": 5},
                {"id": 105, "calc": "compose", "source_x": 101, "source_y": 27}
            ]"#,
        );
        let mut points = PointSet::from_frame(&make_frame());
        resolver.resolve(&mut points);

        assert_eq!(points.get(PointId::Virtual(101)), Some(Point::new(150.0, 100.0)));
        assert_eq!(points.get(PointId::Virtual(102)), Some(Point::new(150.0, 300.0)));
        assert_eq!(points.get(PointId::Virtual(103)), Some(Point::new(150.0, 340.0)));
        assert_eq!(points.get(PointId::Virtual(104)), Some(Point::new(140.0, 105.0)));
        assert_eq!(points.get(PointId::Virtual(105)), Some(Point::new(150.0, 600.0)));
    }

    #[test]
    fn test_missing_source_leaves_point_absent() {
        let resolver = make_resolver(
            r#"[
                {"id": 101, "calc": "midpoint", "sources": [11, 12, 0]},
                {"id": 102, "calc": "offset", "source": 101, "offset_x": 5}
            ]"#,
        );
        let mut points = PointSet::from_frame(&make_frame());
        resolver.resolve(&mut points);

        assert!(points.get(PointId::Virtual(101)).is_none());
        assert!(points.get(PointId::Virtual(102)).is_none());
    }

    #[test]
    fn test_fresh_point_set_does_not_keep_previous_frame() {
        let resolver = make_resolver(r#"[{"id": 101, "calc": "midpoint", "sources": [11, 12]}]"#);

        let mut first = PointSet::from_frame(&make_frame());
        resolver.resolve(&mut first);
        assert!(first.contains(PointId::Virtual(101)));

        let mut second = PointSet::from_frame(&KeypointFrame::new());
        resolver.resolve(&mut second);
        assert!(!second.contains(PointId::Virtual(101)));
    }
}

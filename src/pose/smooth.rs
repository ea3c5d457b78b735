use crate::config::SmoothConfig;
use crate::geometry::Point;
use crate::pose::keypoint::{Joint, KeypointFrame};

/// Displacement-adaptive EMA over every joint of a frame
///
/// Small moves get `min_alpha` (heavy smoothing, suppresses jitter),
/// moves of `distance_scale` pixels or more get `max_alpha` (tracks fast motion).
pub struct KeypointSmoother {
    min_alpha: f32,
    max_alpha: f32,
    distance_scale: f32,
    prev: Option<KeypointFrame>,
}

impl KeypointSmoother {
    pub fn new(min_alpha: f32, max_alpha: f32, distance_scale: f32) -> Self {
        Self {
            min_alpha,
            max_alpha,
            distance_scale: distance_scale.max(f32::EPSILON),
            prev: None,
        }
    }

    pub fn from_config(config: &SmoothConfig) -> Self {
        Self::new(config.min_alpha, config.max_alpha, config.distance_scale)
    }

    pub fn apply(&mut self, frame: &KeypointFrame) -> KeypointFrame {
        let prev = match &self.prev {
            Some(prev) => prev,
            None => {
                self.prev = Some(frame.clone());
                return frame.clone();
            }
        };

        let mut smoothed = KeypointFrame::new();
        for joint in Joint::ALL {
            let Some(current) = frame.get(joint) else {
                continue;
            };
            let point = match prev.get(joint) {
                Some(last) => {
                    let t = (current.distance(last) / self.distance_scale).min(1.0);
                    let alpha = self.min_alpha + (self.max_alpha - self.min_alpha) * t;
                    Point::new(
                        alpha * current.x + (1.0 - alpha) * last.x,
                        alpha * current.y + (1.0 - alpha) * last.y,
                    )
                }
                None => current,
            };
            smoothed.set(joint, point);
        }

        self.prev = Some(smoothed.clone());
        smoothed
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn frame_at(x: f32, y: f32) -> KeypointFrame {
        KeypointFrame::new().with(Joint::Nose, Point::new(x, y))
    }

    #[test]
    fn test_first_frame_passthrough() {
        let mut s = KeypointSmoother::new(0.3, 0.95, 10.0);
        let frame = frame_at(100.0, 200.0);
        assert_eq!(s.apply(&frame), frame);
    }

    #[test]
    fn test_small_move_heavily_smoothed() {
        let mut s = KeypointSmoother::new(0.3, 0.95, 10.0);
        s.apply(&frame_at(100.0, 100.0));
        // 1px move → alpha = 0.3 + 0.65 * 0.1 = 0.365
        let out = s.apply(&frame_at(101.0, 100.0));
        let p = out.get(Joint::Nose).unwrap();
        assert!(approx_eq_f32(p.x, 100.365, 1e-3));
    }

    #[test]
    fn test_large_move_tracks_quickly() {
        let mut s = KeypointSmoother::new(0.3, 0.95, 10.0);
        s.apply(&frame_at(100.0, 100.0));
        let out = s.apply(&frame_at(200.0, 100.0));
        let p = out.get(Joint::Nose).unwrap();
        assert!(approx_eq_f32(p.x, 195.0, 1e-3));
    }

    #[test]
    fn test_absent_joint_stays_absent() {
        let mut s = KeypointSmoother::new(0.3, 0.95, 10.0);
        s.apply(&frame_at(100.0, 100.0));
        let out = s.apply(&KeypointFrame::new());
        assert!(out.get(Joint::Nose).is_none());
        // reappearing joint passes through because the previous smoothed frame lacked it
        let back = s.apply(&frame_at(150.0, 100.0));
        assert_eq!(back.get(Joint::Nose), Some(Point::new(150.0, 100.0)));
    }

    #[test]
    fn test_reset() {
        let mut s = KeypointSmoother::new(0.0, 0.0, 10.0);
        s.apply(&frame_at(0.0, 0.0));
        s.reset();
        let frame = frame_at(50.0, 50.0);
        assert_eq!(s.apply(&frame), frame);
    }
}

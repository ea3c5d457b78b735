pub mod keypoint;
pub mod points;
pub mod smooth;

pub use keypoint::{Joint, Keypoint, KeypointFrame};
pub use points::{Anchor, PointId, PointSet, VIRTUAL_ID_BASE};
pub use smooth::KeypointSmoother;

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

use super::keypoint::{Joint, KeypointFrame};
use crate::geometry::Point;

/// Ids at or above this value name virtual points in exercise documents
pub const VIRTUAL_ID_BASE: u32 = 100;

/// Torso anchors written by the spine estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Anchor {
    Neck,
    HipCenter,
    Thorax,
    Waist,
}

impl Anchor {
    pub fn name(self) -> &'static str {
        match self {
            Anchor::Neck => "neck",
            Anchor::HipCenter => "hip_center",
            Anchor::Thorax => "thorax",
            Anchor::Waist => "waist",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "neck" => Some(Anchor::Neck),
            "hip" | "hip_center" => Some(Anchor::HipCenter),
            "thorax" => Some(Anchor::Thorax),
            "waist" | "lumbar" => Some(Anchor::Waist),
            _ => None,
        }
    }
}

/// Reference to any point the engine can look up in a frame
///
/// Documents write raw joints as BlazePose indices (< 100) or names,
/// virtual points as ids >= 100, and anchors by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "RawPointId")]
pub enum PointId {
    Joint(Joint),
    Virtual(u32),
    Anchor(Anchor),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPointId {
    Index(u32),
    Name(String),
}

impl TryFrom<RawPointId> for PointId {
    type Error = String;

    fn try_from(raw: RawPointId) -> Result<Self, Self::Error> {
        match raw {
            RawPointId::Index(id) if id >= VIRTUAL_ID_BASE => Ok(PointId::Virtual(id)),
            RawPointId::Index(id) => Joint::from_mediapipe_index(id)
                .map(PointId::Joint)
                .ok_or_else(|| format!("unsupported joint index {}", id)),
            RawPointId::Name(name) => Joint::from_name(&name)
                .map(PointId::Joint)
                .or_else(|| Anchor::from_name(&name).map(PointId::Anchor))
                .ok_or_else(|| format!("unknown point name '{}'", name)),
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Joint(j) => write!(f, "{}", j.name()),
            PointId::Virtual(id) => write!(f, "virtual#{}", id),
            PointId::Anchor(a) => write!(f, "{}", a.name()),
        }
    }
}

/// Per-frame working point set: raw joints plus everything derived from them
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    joints: KeypointFrame,
    derived: HashMap<PointId, Point>,
}

impl PointSet {
    pub fn from_frame(frame: &KeypointFrame) -> Self {
        Self {
            joints: frame.clone(),
            derived: HashMap::new(),
        }
    }

    pub fn get(&self, id: PointId) -> Option<Point> {
        match id {
            PointId::Joint(j) => self.joints.get(j),
            other => self.derived.get(&other).copied(),
        }
    }

    /// All points or nothing
    pub fn get_all(&self, ids: &[PointId]) -> Option<Vec<Point>> {
        ids.iter().map(|&id| self.get(id)).collect()
    }

    pub fn get_pair(&self, ids: &[PointId; 2]) -> Option<(Point, Point)> {
        Some((self.get(ids[0])?, self.get(ids[1])?))
    }

    pub fn joint(&self, joint: Joint) -> Option<Point> {
        self.joints.get(joint)
    }

    pub fn insert(&mut self, id: PointId, point: Point) {
        match id {
            PointId::Joint(j) => self.joints.set(j, point),
            other => {
                self.derived.insert(other, point);
            }
        }
    }

    pub fn contains(&self, id: PointId) -> bool {
        self.get(id).is_some()
    }
}

use crate::geometry::Point;

/// Canonical body joints consumed by the engine
///
/// Discriminants are storage slots; `mediapipe_index` maps to the
/// 33-landmark BlazePose numbering used in exercise documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Joint {
    Nose = 0,
    LeftEar = 1,
    RightEar = 2,
    LeftShoulder = 3,
    RightShoulder = 4,
    LeftElbow = 5,
    RightElbow = 6,
    LeftWrist = 7,
    RightWrist = 8,
    LeftHip = 9,
    RightHip = 10,
    LeftKnee = 11,
    RightKnee = 12,
    LeftAnkle = 13,
    RightAnkle = 14,
    LeftHeel = 15,
    RightHeel = 16,
    LeftFootIndex = 17,
    RightFootIndex = 18,
}

impl Joint {
    pub const COUNT: usize = 19;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
        Joint::LeftHeel,
        Joint::RightHeel,
        Joint::LeftFootIndex,
        Joint::RightFootIndex,
    ];

    pub fn mediapipe_index(self) -> u32 {
        match self {
            Joint::Nose => 0,
            Joint::LeftEar => 7,
            Joint::RightEar => 8,
            Joint::LeftShoulder => 11,
            Joint::RightShoulder => 12,
            Joint::LeftElbow => 13,
            Joint::RightElbow => 14,
            Joint::LeftWrist => 15,
            Joint::RightWrist => 16,
            Joint::LeftHip => 23,
            Joint::RightHip => 24,
            Joint::LeftKnee => 25,
            Joint::RightKnee => 26,
            Joint::LeftAnkle => 27,
            Joint::RightAnkle => 28,
            Joint::LeftHeel => 29,
            Joint::RightHeel => 30,
            Joint::LeftFootIndex => 31,
            Joint::RightFootIndex => 32,
        }
    }

    pub fn from_mediapipe_index(index: u32) -> Option<Self> {
        Joint::ALL
            .iter()
            .copied()
            .find(|j| j.mediapipe_index() == index)
    }

    pub fn name(self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
            Joint::LeftHeel => "left_heel",
            Joint::RightHeel => "right_heel",
            Joint::LeftFootIndex => "left_foot_index",
            Joint::RightFootIndex => "right_foot_index",
        }
    }

    /// Snake_case name or the two-letter shorthand (`ls`, `rk`, ...)
    pub fn from_name(name: &str) -> Option<Self> {
        let short = match name {
            "ls" => Some(Joint::LeftShoulder),
            "rs" => Some(Joint::RightShoulder),
            "le" => Some(Joint::LeftElbow),
            "re" => Some(Joint::RightElbow),
            "lw" => Some(Joint::LeftWrist),
            "rw" => Some(Joint::RightWrist),
            "lh" => Some(Joint::LeftHip),
            "rh" => Some(Joint::RightHip),
            "lk" => Some(Joint::LeftKnee),
            "rk" => Some(Joint::RightKnee),
            "la" => Some(Joint::LeftAnkle),
            "ra" => Some(Joint::RightAnkle),
            "lt" => Some(Joint::LeftHeel),
            "rt" => Some(Joint::RightHeel),
            "lf" => Some(Joint::LeftFootIndex),
            "rf" => Some(Joint::RightFootIndex),
            _ => None,
        };
        short.or_else(|| Joint::ALL.iter().copied().find(|j| j.name() == name))
    }
}

/// A single detection from the pose source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Pixel X
    pub x: f32,
    /// Pixel Y
    pub y: f32,
    /// Detection confidence (0.0–1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// Whether confidence reaches the threshold
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One frame of joint positions; an absent joint is `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypointFrame {
    joints: [Option<Point>; Joint::COUNT],
}

impl KeypointFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw detections, dropping joints below `threshold`
    pub fn from_detections<I>(detections: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = (Joint, Keypoint)>,
    {
        let mut frame = Self::new();
        for (joint, kp) in detections {
            if kp.is_valid(threshold) && kp.x.is_finite() && kp.y.is_finite() {
                frame.set(joint, kp.position());
            }
        }
        frame
    }

    pub fn with(mut self, joint: Joint, point: Point) -> Self {
        self.set(joint, point);
        self
    }

    pub fn set(&mut self, joint: Joint, point: Point) {
        self.joints[joint as usize] = Some(point);
    }

    pub fn remove(&mut self, joint: Joint) {
        self.joints[joint as usize] = None;
    }

    pub fn get(&self, joint: Joint) -> Option<Point> {
        self.joints[joint as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.joints.iter().all(Option::is_none)
    }

    /// Present joints in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Joint, Point)> + '_ {
        Joint::ALL
            .iter()
            .filter_map(move |&j| self.get(j).map(|p| (j, p)))
    }
}

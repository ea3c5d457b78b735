//! Recorded keypoint streams
//!
//! One JSON object per line:
//! `{"t": 0.033, "keypoints": {"left_shoulder": [x, y, confidence], ...}}`
//! where `t` is seconds since the start of the recording. Joint keys accept the
//! snake_case names and the short aliases (`ls`, `rh`, ...).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::pose::{Joint, Keypoint};

#[derive(Debug, Deserialize)]
struct RawFrame {
    t: f64,
    #[serde(default)]
    keypoints: BTreeMap<String, [f32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub offset: Duration,
    pub detections: Vec<(Joint, Keypoint)>,
}

impl RecordedFrame {
    pub fn at(&self, start: Instant) -> Instant {
        start + self.offset
    }
}

/// Parse one recording line; unknown joint names are skipped
pub fn parse_line(line: &str) -> Result<RecordedFrame> {
    let raw: RawFrame = serde_json::from_str(line).context("Malformed frame")?;
    if !raw.t.is_finite() || raw.t < 0.0 {
        bail!("Invalid timestamp {}", raw.t);
    }
    let detections = raw
        .keypoints
        .iter()
        .filter_map(|(name, [x, y, c])| {
            Joint::from_name(name).map(|joint| (joint, Keypoint::new(*x, *y, *c)))
        })
        .collect();
    Ok(RecordedFrame {
        offset: Duration::from_secs_f64(raw.t),
        detections,
    })
}

/// Read a whole recording; blank lines are ignored
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<RecordedFrame>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open recording {}", path.display()))?;

    let mut frames = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let frame = parse_line(&line)
            .with_context(|| format!("{}:{}", path.display(), index + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

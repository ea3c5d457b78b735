use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{EngineStatus, ExerciseEngine, FrameOutput, StatusMessage};
use crate::pose::{Joint, Keypoint, KeypointFrame, KeypointSmoother};
use crate::spec::{ConditionId, ExerciseSpec, SpecError};

enum ActiveExercise {
    Ready(Box<ExerciseEngine>),
    Invalid { name: String, reason: String },
}

/// Counters and status of the active exercise
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub exercise: String,
    pub reps: u32,
    pub bad_reps: u32,
    pub error_counts: BTreeMap<ConditionId, u32>,
    pub message: Option<StatusMessage>,
    pub status: EngineStatus,
}

/// Owns the configured exercise list and exactly one active exercise
///
/// Every switch builds a new engine; nothing carries over from the previous exercise.
pub struct Session {
    config: Config,
    active: ActiveExercise,
    smoother: Option<KeypointSmoother>,
}

impl Session {
    /// Starts on the first configured exercise
    pub fn new(config: Config) -> Self {
        let mut session = Self {
            active: ActiveExercise::Invalid {
                name: String::new(),
                reason: "no exercise configured".to_string(),
            },
            smoother: None,
            config,
        };
        if let Some(first) = session.config.exercises.first().map(|e| e.name.clone()) {
            session.switch_to(&first);
        }
        session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn exercise_names(&self) -> impl Iterator<Item = &str> {
        self.config.exercises.iter().map(|e| e.name.as_str())
    }

    pub fn exercise_name(&self) -> &str {
        match &self.active {
            ActiveExercise::Ready(engine) => engine.name(),
            ActiveExercise::Invalid { name, .. } => name,
        }
    }

    pub fn status(&self) -> EngineStatus {
        match &self.active {
            ActiveExercise::Ready(_) => EngineStatus::Running,
            ActiveExercise::Invalid { reason, .. } => EngineStatus::ConfigInvalid {
                reason: reason.clone(),
            },
        }
    }

    pub fn engine(&self) -> Option<&ExerciseEngine> {
        match &self.active {
            ActiveExercise::Ready(engine) => Some(&**engine),
            ActiveExercise::Invalid { .. } => None,
        }
    }

    /// Load the named exercise document and make it active
    pub fn switch_to(&mut self, name: &str) -> EngineStatus {
        let result = match self.config.exercises.iter().find(|e| e.name == name) {
            Some(entry) => ExerciseSpec::load(&entry.path)
                .map_err(|e| format!("{}: {}", entry.path.display(), e)),
            None => Err(format!("unknown exercise '{}'", name)),
        };
        self.install(name, result)
    }

    /// Make an already-parsed document active
    pub fn switch_to_spec(&mut self, spec: &ExerciseSpec) -> EngineStatus {
        let name = spec.name.clone();
        self.install(&name, Ok(spec.clone()))
    }

    /// Parse `text` as an exercise document and make it active
    pub fn switch_to_json(&mut self, name: &str, text: &str) -> EngineStatus {
        let result = ExerciseSpec::from_json_str(text).map_err(|e: SpecError| e.to_string());
        self.install(name, result)
    }

    fn install(&mut self, name: &str, result: Result<ExerciseSpec, String>) -> EngineStatus {
        self.smoother = self
            .config
            .smooth
            .enabled
            .then(|| KeypointSmoother::from_config(&self.config.smooth));

        self.active = match result {
            Ok(mut spec) => {
                if spec.name.is_empty() {
                    spec.name = name.to_string();
                }
                info!(exercise = %spec.name, "Switched exercise");
                ActiveExercise::Ready(Box::new(ExerciseEngine::new(&spec, &self.config)))
            }
            Err(reason) => {
                warn!(exercise = %name, %reason, "Exercise document rejected");
                ActiveExercise::Invalid {
                    name: name.to_string(),
                    reason,
                }
            }
        };
        self.status()
    }

    /// Filter raw detections by confidence, smooth, and run the active engine
    pub fn process<I>(&mut self, detections: I, now: Instant) -> FrameOutput
    where
        I: IntoIterator<Item = (Joint, Keypoint)>,
    {
        let frame =
            KeypointFrame::from_detections(detections, self.config.engine.confidence_threshold);
        self.process_frame(&frame, now)
    }

    /// Run an already-filtered frame
    pub fn process_frame(&mut self, frame: &KeypointFrame, now: Instant) -> FrameOutput {
        let status = self.status();
        let ActiveExercise::Ready(engine) = &mut self.active else {
            return FrameOutput::inert(status);
        };
        match self.smoother.as_mut() {
            Some(smoother) => engine.process(&smoother.apply(frame), now),
            None => engine.process(frame, now),
        }
    }

    pub fn snapshot(&mut self, now: Instant) -> SessionSnapshot {
        let status = self.status();
        match &mut self.active {
            ActiveExercise::Ready(engine) => SessionSnapshot {
                exercise: engine.name().to_string(),
                reps: engine.reps(),
                bad_reps: engine.bad_reps(),
                error_counts: engine.error_counts().clone(),
                message: engine.message(now).cloned(),
                status,
            },
            ActiveExercise::Invalid { name, .. } => SessionSnapshot {
                exercise: name.clone(),
                reps: 0,
                bad_reps: 0,
                error_counts: BTreeMap::new(),
                message: None,
                status,
            },
        }
    }
}

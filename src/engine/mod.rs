//! Per-exercise rep counting and form correction
//!
//! One [`ExerciseEngine`] is built from one exercise document and fed one keypoint frame
//! at a time. It owns every piece of per-exercise state: calibration baselines, the rep
//! phase, condition latches and the feedback lock. Switching exercises means building a
//! new engine.

pub mod arbiter;
pub mod calibrator;
pub mod condition;
pub mod message;
pub mod metric;
pub mod readiness;
pub mod render;
pub mod spine;
pub mod state_machine;
pub mod virtual_points;

pub use condition::ConditionVerdicts;
pub use message::StatusMessage;
pub use render::{ColorRole, DrawDirective, LineStyle, SoundEvent};
pub use spine::SpineReading;
pub use state_machine::{Phase, RepEvent};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Config;
use crate::pose::{KeypointFrame, PointSet};
use crate::spec::{ConditionId, ExerciseSpec};
use arbiter::PriorityArbiter;
use calibrator::DynamicCalibrator;
use condition::ConditionEvaluator;
use message::MessageBoard;
use metric::FrameContext;
use readiness::ReadinessGate;
use render::ElementRenderer;
use spine::SpineEstimator;
use state_machine::RepStateMachine;
use virtual_points::VirtualPointResolver;

/// Seconds from a document or config file as a `Duration`
///
/// Negative and NaN give zero; anything too large for `Duration` saturates.
pub(crate) fn secs_to_duration(secs: f32) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum EngineStatus {
    #[default]
    Running,
    /// Required points out of view; nothing past the spine estimate ran
    WaitingForReadiness,
    /// The exercise document failed to load; the engine is inert
    ConfigInvalid { reason: String },
}

/// Everything one frame produces
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    pub phase: Phase,
    pub reps: u32,
    pub bad_reps: u32,
    pub error_counts: BTreeMap<ConditionId, u32>,
    pub event: Option<RepEvent>,
    /// At most one per rep end
    pub sound: Option<SoundEvent>,
    pub message: Option<StatusMessage>,
    pub directives: Vec<DrawDirective>,
    /// What the directives were drawn from
    pub verdicts: ConditionVerdicts,
    pub spine: Option<SpineReading>,
    pub status: EngineStatus,
}

impl FrameOutput {
    /// Output of an engine that cannot run
    pub fn inert(status: EngineStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

pub struct ExerciseEngine {
    name: String,
    resolver: VirtualPointResolver,
    calibrator: DynamicCalibrator,
    spine: SpineEstimator,
    readiness: Option<ReadinessGate>,
    machine: RepStateMachine,
    conditions: ConditionEvaluator,
    arbiter: PriorityArbiter,
    board: MessageBoard,
    renderer: ElementRenderer,
    last_rep: ConditionVerdicts,
}

impl ExerciseEngine {
    pub fn new(spec: &ExerciseSpec, config: &Config) -> Self {
        let evaluation = &spec.evaluation;
        let conditions = ConditionEvaluator::new(evaluation, config.engine.default_priority);
        let last_rep = conditions.rep_verdicts().clone();

        info!(
            exercise = %spec.name,
            virtual_points = spec.virtual_points.len(),
            dynamic_vars = spec.dynamic_vars.len(),
            conditions = evaluation.conditions.len(),
            "Exercise engine ready"
        );

        Self {
            name: spec.name.clone(),
            resolver: VirtualPointResolver::new(&spec.virtual_points),
            calibrator: DynamicCalibrator::new(&spec.dynamic_vars),
            spine: SpineEstimator::new(&config.spine),
            readiness: spec
                .readiness
                .as_ref()
                .map(|r| ReadinessGate::new(r, config.engine.readiness_timeout_secs)),
            machine: RepStateMachine::new(
                &evaluation.state_machine,
                config.engine.count_cooldown_secs,
            ),
            conditions,
            arbiter: PriorityArbiter::new(&config.feedback),
            board: MessageBoard::new(),
            renderer: ElementRenderer::new(spec),
            last_rep,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn reps(&self) -> u32 {
        self.machine.reps()
    }

    pub fn bad_reps(&self) -> u32 {
        self.arbiter.bad_reps()
    }

    pub fn error_counts(&self) -> &BTreeMap<ConditionId, u32> {
        self.arbiter.error_counts()
    }

    /// Condition currently holding the feedback lock
    pub fn active_condition(&self) -> Option<&ConditionId> {
        self.arbiter.active()
    }

    pub fn calibrator(&self) -> &DynamicCalibrator {
        &self.calibrator
    }

    pub fn message(&mut self, now: Instant) -> Option<&StatusMessage> {
        self.board.current(now)
    }

    /// Run one frame through the pipeline
    pub fn process(&mut self, frame: &KeypointFrame, now: Instant) -> FrameOutput {
        let mut points = PointSet::from_frame(frame);
        self.resolver.resolve(&mut points);

        let phase = self.machine.phase();
        self.calibrator.update_from_frame(&points, phase);
        let spine = self.spine.analyze(&mut points, phase);

        if phase == Phase::Start {
            if let Some(gate) = self.readiness.as_mut() {
                if !gate.check(&points, &mut self.board, now) {
                    return FrameOutput {
                        spine,
                        status: EngineStatus::WaitingForReadiness,
                        ..self.summary(phase, now)
                    };
                }
            }
        }

        let ctx = FrameContext {
            points: &points,
            calibrator: &self.calibrator,
            spine_fault: spine.is_some_and(|s| s.fault),
        };

        let event = self.machine.update(&ctx, now);
        if event == Some(RepEvent::Entered) {
            self.conditions.begin_rep();
        }

        let phase = self.machine.phase();
        let live = self.conditions.evaluate(&ctx, phase);

        let mut sound = None;
        if event == Some(RepEvent::Completed) {
            let committed = self.conditions.rep_verdicts().clone();
            sound = Some(self.arbiter.commit_rep(
                &committed,
                self.conditions.conditions(),
                &mut self.board,
                now,
            ));
            self.last_rep = committed;
        }

        let verdicts = if phase == Phase::Active {
            live
        } else {
            self.last_rep.clone()
        };
        let active: Vec<ConditionId> = self.arbiter.active().cloned().into_iter().collect();
        let directives =
            self.renderer
                .render(&points, &active, &verdicts, &self.conditions.by_priority());

        FrameOutput {
            event,
            sound,
            directives,
            verdicts,
            spine,
            ..self.summary(phase, now)
        }
    }

    fn summary(&mut self, phase: Phase, now: Instant) -> FrameOutput {
        FrameOutput {
            phase,
            reps: self.machine.reps(),
            bad_reps: self.arbiter.bad_reps(),
            error_counts: self.arbiter.error_counts().clone(),
            message: self.board.current(now).cloned(),
            ..FrameOutput::default()
        }
    }
}

//! Exercise documents
//!
//! A document is parsed once into closed tagged unions. Unknown `calc`, `type`,
//! `metric` or `correction_mode` values are rejected here, never at evaluation time.

mod error;

pub use error::SpecError;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::engine::render::ColorRole;
use crate::engine::Phase;
use crate::pose::{PointId, VIRTUAL_ID_BASE};

/// Identifier of a declared condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionId(String);

impl ConditionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ConditionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub virtual_points: Vec<VirtualPointSpec>,
    #[serde(default)]
    pub dynamic_vars: Vec<DynamicVarSpec>,
    pub evaluation: EvaluationSpec,
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub styles: BTreeMap<String, StyleSpec>,
    #[serde(default)]
    pub readiness: Option<ReadinessSpec>,
}

// --- Virtual points and calibrated variables ---

#[derive(Debug, Clone, Deserialize)]
pub struct VirtualPointSpec {
    pub id: u32,
    #[serde(flatten)]
    pub calc: VirtualCalc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "calc", rename_all = "snake_case")]
pub enum VirtualCalc {
    Midpoint {
        sources: Vec<PointId>,
    },
    ProjectionVertical {
        source: PointId,
        #[serde(default)]
        offset_y: f32,
    },
    Offset {
        source: PointId,
        #[serde(default)]
        offset_x: f32,
        #[serde(default)]
        offset_y: f32,
    },
    Compose {
        source_x: PointId,
        source_y: PointId,
    },
}

impl VirtualCalc {
    pub fn sources(&self) -> Vec<PointId> {
        match self {
            VirtualCalc::Midpoint { sources } => sources.clone(),
            VirtualCalc::ProjectionVertical { source, .. } | VirtualCalc::Offset { source, .. } => {
                vec![*source]
            }
            VirtualCalc::Compose { source_x, source_y } => vec![*source_x, *source_y],
        }
    }
}

/// How a two-point measurement is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    /// |y1 - y2|
    #[default]
    DistanceY,
    /// |x1 - x2|
    DistanceX,
    /// Euclidean
    Distance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamicVarSpec {
    pub name: String,
    #[serde(default)]
    pub source_type: MeasureKind,
    pub points: [PointId; 2],
    /// Phase in which the baseline may blend upward
    #[serde(default)]
    pub active_state: Phase,
    #[serde(default = "default_decay")]
    pub decay: f32,
    #[serde(default = "default_damping")]
    pub damping: f32,
}

fn default_decay() -> f32 { 0.9995 }
fn default_damping() -> f32 { 0.05 }

// --- Metrics and the rep state machine ---

/// Default dynamic variable read by `compression_ratio`
pub const DEFAULT_BASELINE_VAR: &str = "standing_baseline";

/// Upper bound for any `timeout_sec` in a document
pub const MAX_TIMEOUT_SECS: f32 = 3600.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricSpec {
    CompressionRatio {
        #[serde(default)]
        points: Option<[PointId; 2]>,
        #[serde(default)]
        baseline: Option<String>,
    },
    VerticalDiff {
        points: [PointId; 2],
    },
    Angle {
        points: [PointId; 3],
    },
}

impl MetricSpec {
    pub fn points(&self) -> Vec<PointId> {
        match self {
            MetricSpec::CompressionRatio { points, .. } => {
                points.map(|p| p.to_vec()).unwrap_or_default()
            }
            MetricSpec::VerticalDiff { points } => points.to_vec(),
            MetricSpec::Angle { points } => points.to_vec(),
        }
    }

    pub fn baseline_name(&self) -> Option<&str> {
        match self {
            MetricSpec::CompressionRatio { baseline, .. } => baseline.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">")]
    Greater,
}

impl Operator {
    pub fn holds(self, value: f32, threshold: f32) -> bool {
        match self {
            Operator::Less => value < threshold,
            Operator::Greater => value > threshold,
        }
    }
}

/// A metric compared against a threshold
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerSpec {
    #[serde(flatten)]
    pub metric: MetricSpec,
    #[serde(default)]
    pub operator: Option<Operator>,
    pub threshold: f32,
}

impl TriggerSpec {
    pub fn operator_or(&self, default: Operator) -> Operator {
        self.operator.unwrap_or(default)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZombieBreakerSpec {
    pub timeout_sec: f32,
    pub reset_condition: TriggerSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateMachineSpec {
    pub trigger_down: TriggerSpec,
    pub trigger_up: TriggerSpec,
    #[serde(default)]
    pub zombie_breaker: Option<ZombieBreakerSpec>,
}

// --- Conditions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    #[default]
    Realtime,
    LatchFail,
    LatchPass,
    StrictPass,
}

/// Validity interval for a condition's latch
///
/// Every bound that is present must hold for the frame to count as in range.
#[derive(Debug, Clone, Deserialize)]
pub struct ConstraintSpec {
    #[serde(flatten)]
    pub metric: MetricSpec,
    #[serde(default)]
    pub min: Option<f32>,
    #[serde(default)]
    pub max: Option<f32>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub operator: Option<Operator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideMode {
    /// Fails if any side fails
    #[default]
    Any,
    /// Fails only if every measured side fails
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    RatioWidth {
        numerator_points: [PointId; 2],
        denominator_points: [PointId; 2],
        #[serde(default)]
        min: f32,
    },
    RatioVerticalDynamic {
        points: [PointId; 2],
        baseline_var: String,
        #[serde(default)]
        min: Option<f32>,
        #[serde(default)]
        max: Option<f32>,
    },
    AngleVertical {
        #[serde(deserialize_with = "de_side_pairs")]
        points: Vec<[PointId; 2]>,
        #[serde(default = "default_angle_max")]
        max: f32,
        #[serde(default)]
        side_mode: SideMode,
    },
    Deviation {
        points: [PointId; 3],
        #[serde(default = "default_deviation_max")]
        max: f32,
        #[serde(default = "default_true")]
        normalize: bool,
    },
    ChainSync {
        metric_1: MetricSpec,
        metric_2: MetricSpec,
        #[serde(default = "default_scale")]
        scale: f32,
        #[serde(default)]
        offset: f32,
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },
    SpineRounding {},
}

fn default_angle_max() -> f32 { 20.0 }
fn default_deviation_max() -> f32 { 0.1 }
fn default_true() -> bool { true }
fn default_scale() -> f32 { 1.0 }
fn default_tolerance() -> f32 { 15.0 }

/// `angle_vertical` accepts either one pair or a list of pairs
fn de_side_pairs<'de, D>(deserializer: D) -> Result<Vec<[PointId; 2]>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SidePairs {
        One([PointId; 2]),
        Many(Vec<[PointId; 2]>),
    }

    Ok(match SidePairs::deserialize(deserializer)? {
        SidePairs::One(pair) => vec![pair],
        SidePairs::Many(pairs) => pairs,
    })
}

impl CheckSpec {
    fn points(&self) -> Vec<PointId> {
        match self {
            CheckSpec::RatioWidth {
                numerator_points,
                denominator_points,
                ..
            } => numerator_points.iter().chain(denominator_points).copied().collect(),
            CheckSpec::RatioVerticalDynamic { points, .. } => points.to_vec(),
            CheckSpec::AngleVertical { points, .. } => points.iter().flatten().copied().collect(),
            CheckSpec::Deviation { points, .. } => points.to_vec(),
            CheckSpec::ChainSync {
                metric_1, metric_2, ..
            } => metric_1.points().into_iter().chain(metric_2.points()).collect(),
            CheckSpec::SpineRounding {} => Vec::new(),
        }
    }

    fn metrics(&self) -> Vec<&MetricSpec> {
        match self {
            CheckSpec::ChainSync {
                metric_1, metric_2, ..
            } => vec![metric_1, metric_2],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionSpec {
    pub id: ConditionId,
    #[serde(flatten)]
    pub check: CheckSpec,
    #[serde(default)]
    pub correction_mode: CorrectionMode,
    #[serde(default)]
    pub correction_constraint: Option<ConstraintSpec>,
    #[serde(default)]
    pub priority: Option<u32>,
    /// Shown while this condition holds the feedback lock
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    All,
    Exclusive,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogicControl {
    #[serde(default)]
    pub suppress_lower_priority: bool,
    #[serde(default)]
    pub display_mode: DisplayMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationSpec {
    pub state_machine: StateMachineSpec,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub logic_control: LogicControl,
}

// --- Draw templates ---

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ElementSpec {
    Conditional {
        condition_ref: ConditionId,
        #[serde(default)]
        on_good: Option<DrawTemplate>,
        #[serde(default)]
        on_bad: Option<DrawTemplate>,
    },
    Always(DrawTemplate),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrawTemplate {
    #[serde(flatten)]
    pub shape: ShapeTemplate,
    #[serde(default)]
    pub style_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    #[default]
    Check,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeTemplate {
    Line {
        from: PointId,
        to: PointId,
        #[serde(default = "default_line_width")]
        width: f32,
        #[serde(default)]
        is_dashed: bool,
    },
    Arrow {
        #[serde(alias = "start")]
        from: PointId,
        #[serde(default)]
        to: Option<PointId>,
        #[serde(default)]
        direction: Option<[f32; 2]>,
        #[serde(default = "default_arrow_length")]
        length: f32,
        #[serde(default = "default_arrow_gap")]
        gap: f32,
    },
    Circle {
        center: PointId,
        #[serde(default = "default_radius")]
        radius: f32,
        #[serde(default = "default_true")]
        filled: bool,
    },
    Icon {
        center: PointId,
        #[serde(default)]
        icon_name: IconKind,
        #[serde(default = "default_icon_scale")]
        scale: f32,
    },
    Polyline {
        points: Vec<PointId>,
        #[serde(default = "default_polyline_width")]
        width: f32,
    },
}

fn default_line_width() -> f32 { 2.0 }
fn default_arrow_length() -> f32 { 40.0 }
fn default_arrow_gap() -> f32 { 25.0 }
fn default_radius() -> f32 { 10.0 }
fn default_icon_scale() -> f32 { 1.2 }
fn default_polyline_width() -> f32 { 4.0 }

impl ShapeTemplate {
    fn points(&self) -> Vec<PointId> {
        match self {
            ShapeTemplate::Line { from, to, .. } => vec![*from, *to],
            ShapeTemplate::Arrow { from, to, .. } => std::iter::once(*from).chain(*to).collect(),
            ShapeTemplate::Circle { center, .. } | ShapeTemplate::Icon { center, .. } => {
                vec![*center]
            }
            ShapeTemplate::Polyline { points, .. } => points.clone(),
        }
    }
}

/// Named style overrides referenced by a template's `style_key`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StyleSpec {
    #[serde(default)]
    pub color: ColorRole,
    #[serde(default)]
    pub dashed: bool,
    #[serde(default)]
    pub width: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadinessSpec {
    pub required_points: Vec<PointId>,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub timeout_sec: Option<f32>,
}

// --- Loading ---

impl ExerciseSpec {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SpecError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SpecError> {
        let spec: ExerciseSpec = serde_json::from_str(&strip_line_comments(text))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn condition(&self, id: &ConditionId) -> Option<&ConditionSpec> {
        self.evaluation.conditions.iter().find(|c| &c.id == id)
    }

    pub fn dynamic_var(&self, name: &str) -> Option<&DynamicVarSpec> {
        self.dynamic_vars.iter().find(|v| v.name == name)
    }

    fn validate(&self) -> Result<(), SpecError> {
        // Virtual points: ids, uniqueness, declaration order
        let mut declared: HashSet<u32> = HashSet::new();
        for vp in &self.virtual_points {
            if vp.id < VIRTUAL_ID_BASE {
                return Err(SpecError::invalid(
                    format!("virtual point {}", vp.id),
                    format!("ids must be >= {}", VIRTUAL_ID_BASE),
                ));
            }
            if let VirtualCalc::Midpoint { sources } = &vp.calc {
                if sources.is_empty() {
                    return Err(SpecError::invalid(
                        format!("virtual point {}", vp.id),
                        "midpoint needs at least one source",
                    ));
                }
            }
            for source in vp.calc.sources() {
                if let PointId::Virtual(sid) = source {
                    if !declared.contains(&sid) {
                        return Err(SpecError::ForwardReference {
                            id: vp.id,
                            missing: source,
                        });
                    }
                }
            }
            if !declared.insert(vp.id) {
                return Err(SpecError::DuplicateVirtualPoint(vp.id));
            }
        }

        let check_points = |context: &str, points: &[PointId]| -> Result<(), SpecError> {
            for &point in points {
                if let PointId::Virtual(id) = point {
                    if !declared.contains(&id) {
                        return Err(SpecError::UnknownPoint {
                            context: context.to_string(),
                            point,
                        });
                    }
                }
            }
            Ok(())
        };

        let check_baseline = |context: &str, name: &str| -> Result<(), SpecError> {
            if self.dynamic_var(name).is_none() {
                return Err(SpecError::UnknownBaseline {
                    context: context.to_string(),
                    name: name.to_string(),
                });
            }
            Ok(())
        };

        let check_metric = |context: &str, metric: &MetricSpec| -> Result<(), SpecError> {
            check_points(context, &metric.points())?;
            if let Some(name) = metric.baseline_name() {
                check_baseline(context, name)?;
            }
            Ok(())
        };

        for var in &self.dynamic_vars {
            let context = format!("dynamic variable '{}'", var.name);
            check_points(&context, &var.points)?;
            check_unit_interval(&context, "decay", var.decay)?;
            check_unit_interval(&context, "damping", var.damping)?;
        }

        let sm = &self.evaluation.state_machine;
        check_metric("trigger_down", &sm.trigger_down.metric)?;
        check_metric("trigger_up", &sm.trigger_up.metric)?;
        if let Some(zb) = &sm.zombie_breaker {
            if zb.timeout_sec == 0.0 {
                return Err(SpecError::invalid(
                    "zombie_breaker",
                    "timeout_sec must be positive",
                ));
            }
            check_timeout("zombie_breaker", zb.timeout_sec)?;
            check_metric("zombie_breaker", &zb.reset_condition.metric)?;
        }

        let mut ids: HashSet<&ConditionId> = HashSet::new();
        for cond in &self.evaluation.conditions {
            if !ids.insert(&cond.id) {
                return Err(SpecError::DuplicateCondition(cond.id.clone()));
            }
            let context = format!("condition '{}'", cond.id);
            check_points(&context, &cond.check.points())?;
            for metric in cond.check.metrics() {
                check_metric(&context, metric)?;
            }
            if let CheckSpec::RatioVerticalDynamic { baseline_var, .. } = &cond.check {
                check_baseline(&context, baseline_var)?;
            }
            if let CheckSpec::AngleVertical { points, .. } = &cond.check {
                if points.is_empty() {
                    return Err(SpecError::invalid(context, "angle_vertical needs a point pair"));
                }
            }
            if let Some(constraint) = &cond.correction_constraint {
                check_metric(&context, &constraint.metric)?;
                if constraint.operator.is_some() && constraint.threshold.is_none() {
                    return Err(SpecError::invalid(
                        context,
                        "constraint operator given without threshold",
                    ));
                }
            }
        }

        for (index, element) in self.elements.iter().enumerate() {
            let context = format!("element #{}", index);
            let templates: Vec<&DrawTemplate> = match element {
                ElementSpec::Conditional {
                    condition_ref,
                    on_good,
                    on_bad,
                } => {
                    if !ids.contains(condition_ref) {
                        return Err(SpecError::UnknownConditionRef(condition_ref.clone()));
                    }
                    on_good.iter().chain(on_bad.iter()).collect()
                }
                ElementSpec::Always(template) => vec![template],
            };
            for template in templates {
                check_points(&context, &template.shape.points())?;
                if let ShapeTemplate::Arrow { to, direction, .. } = &template.shape {
                    if to.is_none() && direction.is_none() {
                        return Err(SpecError::invalid(context, "arrow needs 'to' or 'direction'"));
                    }
                }
            }
        }

        if let Some(readiness) = &self.readiness {
            check_points("readiness", &readiness.required_points)?;
            if let Some(timeout) = readiness.timeout_sec {
                check_timeout("readiness", timeout)?;
            }
        }

        Ok(())
    }
}

fn check_unit_interval(context: &str, field: &str, value: f32) -> Result<(), SpecError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(SpecError::invalid(
            context,
            format!("{} must be in (0, 1], got {}", field, value),
        ))
    }
}

fn check_timeout(context: &str, secs: f32) -> Result<(), SpecError> {
    if secs.is_finite() && (0.0..=MAX_TIMEOUT_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(SpecError::invalid(
            context,
            format!("timeout_sec must be in [0, {}], got {}", MAX_TIMEOUT_SECS, secs),
        ))
    }
}

/// Remove `//` comments that sit outside string literals
pub fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out
}

use std::collections::BTreeMap;

use super::calibrator::MIN_BASELINE;
use super::metric::{self, FrameContext};
use super::Phase;
use crate::geometry::{angle_from_vertical, distance_to_line};
use crate::spec::{
    CheckSpec, ConditionId, ConstraintSpec, CorrectionMode, EvaluationSpec, Operator, SideMode,
};

/// Per-condition verdicts, `true` = good
pub type ConditionVerdicts = BTreeMap<ConditionId, bool>;

/// Per-rep persisted verdict; each variant carries only what its mode needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latch {
    /// Follows the current frame
    Realtime { good: bool },
    /// Starts good; one in-range failure sticks for the rest of the rep
    LatchFail { ok: bool },
    /// Starts bad; one in-range success sticks for the rest of the rep
    LatchPass { ok: bool },
    /// Starts bad; tracks the check while in range, frozen once the interval is left
    StrictPass { ok: bool, entered: bool, frozen: bool },
}

impl Latch {
    pub fn new(mode: CorrectionMode) -> Self {
        match mode {
            CorrectionMode::Realtime => Latch::Realtime { good: true },
            CorrectionMode::LatchFail => Latch::LatchFail { ok: true },
            CorrectionMode::LatchPass => Latch::LatchPass { ok: false },
            CorrectionMode::StrictPass => Latch::StrictPass {
                ok: false,
                entered: false,
                frozen: false,
            },
        }
    }

    pub fn update(&mut self, good: bool, in_range: bool) -> bool {
        match self {
            Latch::Realtime { good: last } => *last = good,
            Latch::LatchFail { ok } => {
                if in_range && !good {
                    *ok = false;
                }
            }
            Latch::LatchPass { ok } => {
                if in_range && good {
                    *ok = true;
                }
            }
            Latch::StrictPass { ok, entered, frozen } => {
                if !*frozen {
                    if in_range {
                        *ok = good;
                        *entered = true;
                    } else if *entered {
                        *frozen = true;
                    }
                }
            }
        }
        self.verdict()
    }

    pub fn verdict(&self) -> bool {
        match *self {
            Latch::Realtime { good } => good,
            Latch::LatchFail { ok } | Latch::LatchPass { ok } | Latch::StrictPass { ok, .. } => ok,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub id: ConditionId,
    pub check: CheckSpec,
    pub mode: CorrectionMode,
    pub constraint: Option<ConstraintSpec>,
    /// Lower number wins
    pub priority: u32,
    pub message: Option<String>,
}

/// Evaluates all declared conditions and owns their per-rep latches
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    conditions: Vec<Condition>,
    latches: Vec<Latch>,
    suppress_lower_priority: bool,
    rep_verdicts: ConditionVerdicts,
}

impl ConditionEvaluator {
    pub fn new(spec: &EvaluationSpec, default_priority: u32) -> Self {
        let conditions: Vec<Condition> = spec
            .conditions
            .iter()
            .map(|c| Condition {
                id: c.id.clone(),
                check: c.check.clone(),
                mode: c.correction_mode,
                constraint: c.correction_constraint.clone(),
                priority: c.priority.unwrap_or(default_priority),
                message: c.message.clone(),
            })
            .collect();
        let latches = conditions.iter().map(|c| Latch::new(c.mode)).collect();

        let mut evaluator = Self {
            conditions,
            latches,
            suppress_lower_priority: spec.logic_control.suppress_lower_priority,
            rep_verdicts: ConditionVerdicts::new(),
        };
        evaluator.rep_verdicts = evaluator.latch_verdicts();
        evaluator
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn get(&self, id: &ConditionId) -> Option<&Condition> {
        self.conditions.iter().find(|c| &c.id == id)
    }

    /// Conditions in ascending priority number, ties in declaration order
    pub fn by_priority(&self) -> Vec<&Condition> {
        let mut sorted: Vec<&Condition> = self.conditions.iter().collect();
        sorted.sort_by_key(|c| c.priority);
        sorted
    }

    /// Re-initialize every latch for a new rep
    pub fn begin_rep(&mut self) {
        for (latch, cond) in self.latches.iter_mut().zip(&self.conditions) {
            *latch = Latch::new(cond.mode);
        }
        self.rep_verdicts = self.latch_verdicts();
    }

    /// Run every check for this frame
    ///
    /// The returned map is the live display state. While `phase` is active it is also
    /// recorded as this rep's verdicts.
    pub fn evaluate(&mut self, ctx: &FrameContext<'_>, phase: Phase) -> ConditionVerdicts {
        let mut verdicts = ConditionVerdicts::new();
        for (cond, latch) in self.conditions.iter().zip(self.latches.iter_mut()) {
            let good = check(&cond.check, ctx);
            let in_range = cond
                .constraint
                .as_ref()
                .map_or(true, |c| constraint_holds(c, ctx));
            verdicts.insert(cond.id.clone(), latch.update(good, in_range));
        }

        if self.suppress_lower_priority {
            self.suppress(&mut verdicts);
        }
        if phase == Phase::Active {
            self.rep_verdicts = verdicts.clone();
        }
        verdicts
    }

    /// Verdicts recorded during the current (or last) rep
    pub fn rep_verdicts(&self) -> &ConditionVerdicts {
        &self.rep_verdicts
    }

    /// Keep only the highest-priority failure; every other failure reads as good
    pub fn suppress(&self, verdicts: &mut ConditionVerdicts) {
        let mut kept = false;
        for cond in self.by_priority() {
            if let Some(good) = verdicts.get_mut(&cond.id) {
                if !*good {
                    if kept {
                        *good = true;
                    }
                    kept = true;
                }
            }
        }
    }

    fn latch_verdicts(&self) -> ConditionVerdicts {
        self.conditions
            .iter()
            .zip(&self.latches)
            .map(|(c, l)| (c.id.clone(), l.verdict()))
            .collect()
    }
}

/// Whether the frame lies inside a condition's validity interval
pub fn constraint_holds(constraint: &ConstraintSpec, ctx: &FrameContext<'_>) -> bool {
    let value = metric::evaluate(&constraint.metric, ctx);
    if constraint.max.is_some_and(|max| value > max) {
        return false;
    }
    if constraint.min.is_some_and(|min| value < min) {
        return false;
    }
    if let Some(threshold) = constraint.threshold {
        let op = constraint.operator.unwrap_or(Operator::Greater);
        if !op.holds(value, threshold) {
            return false;
        }
    }
    true
}

/// Stateless per-frame check; missing inputs count as good
pub fn check(spec: &CheckSpec, ctx: &FrameContext<'_>) -> bool {
    let points = ctx.points;
    match spec {
        CheckSpec::RatioWidth {
            numerator_points,
            denominator_points,
            min,
        } => {
            let (Some((n1, n2)), Some((d1, d2))) = (
                points.get_pair(numerator_points),
                points.get_pair(denominator_points),
            ) else {
                return true;
            };
            let ratio = (n1.x - n2.x).abs() / (d1.x - d2.x).abs().max(MIN_BASELINE);
            ratio >= *min
        }
        CheckSpec::RatioVerticalDynamic {
            points: pair,
            baseline_var,
            min,
            max,
        } => {
            let Some((a, b)) = points.get_pair(pair) else {
                return true;
            };
            let ratio = ctx.calibrator.get_ratio(baseline_var, (a.y - b.y).abs());
            !max.is_some_and(|m| ratio > m) && !min.is_some_and(|m| ratio < m)
        }
        CheckSpec::AngleVertical {
            points: pairs,
            max,
            side_mode,
        } => {
            let failed = pairs
                .iter()
                .filter_map(|pair| points.get_pair(pair))
                .filter(|(a, b)| angle_from_vertical(*a, *b) > *max)
                .count();
            match side_mode {
                SideMode::Any => failed == 0,
                // unmeasured sides count as passing
                SideMode::All => failed < pairs.len(),
            }
        }
        CheckSpec::Deviation {
            points: ids,
            max,
            normalize,
        } => {
            let Some(p) = points.get_all(ids) else {
                return true;
            };
            let (dist, len) = distance_to_line(p[0], p[1], p[2]);
            let deviation = if *normalize { dist / len } else { dist };
            deviation <= *max
        }
        CheckSpec::ChainSync {
            metric_1,
            metric_2,
            scale,
            offset,
            tolerance,
        } => {
            let m1 = metric::evaluate(metric_1, ctx);
            let m2 = metric::evaluate(metric_2, ctx);
            (m1 - (m2 * scale + offset)).abs() <= *tolerance
        }
        CheckSpec::SpineRounding {} => !ctx.spine_fault,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::calibrator::DynamicCalibrator;
    use crate::geometry::Point;
    use crate::pose::{Joint, KeypointFrame, PointSet};
    use crate::spec::{ConditionSpec, DynamicVarSpec};

    fn run(mode: CorrectionMode, frames: &[(bool, bool)]) -> bool {
        let mut latch = Latch::new(mode);
        for &(good, in_range) in frames {
            latch.update(good, in_range);
        }
        latch.verdict()
    }

    fn make_check(json: &str) -> CheckSpec {
        let cond: ConditionSpec = serde_json::from_str(json).unwrap();
        cond.check
    }

    fn eval_check(check_spec: &CheckSpec, frame: &KeypointFrame) -> bool {
        let points = PointSet::from_frame(frame);
        let cal = DynamicCalibrator::default();
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };
        check(check_spec, &ctx)
    }

    #[test]
    fn test_latch_fail_one_strike() {
        let frames = [true, true, false, true, true].map(|g| (g, true));
        assert!(!run(CorrectionMode::LatchFail, &frames));
    }

    #[test]
    fn test_latch_fail_ignores_out_of_range_failure() {
        let frames = [(true, true), (false, false), (true, true)];
        assert!(run(CorrectionMode::LatchFail, &frames));
    }

    #[test]
    fn test_latch_pass_one_success() {
        let frames = [false, false, true, false].map(|g| (g, true));
        assert!(run(CorrectionMode::LatchPass, &frames));
    }

    #[test]
    fn test_latch_pass_ignores_out_of_range_success() {
        let frames = [(false, true), (true, false), (false, true)];
        assert!(!run(CorrectionMode::LatchPass, &frames));
    }

    #[test]
    fn test_strict_pass_exit_while_bad() {
        let frames = [(true, true), (false, true), (false, false), (true, false)];
        assert!(!run(CorrectionMode::StrictPass, &frames));
    }

    #[test]
    fn test_strict_pass_exit_while_good() {
        let frames = [(true, true), (false, true), (true, true), (false, false)];
        assert!(run(CorrectionMode::StrictPass, &frames));
    }

    #[test]
    fn test_strict_pass_frozen_after_exit() {
        let frames = [(true, true), (false, false), (false, true)];
        assert!(run(CorrectionMode::StrictPass, &frames));
    }

    #[test]
    fn test_strict_pass_waits_for_interval() {
        let frames = [(true, false), (true, false)];
        assert!(!run(CorrectionMode::StrictPass, &frames));
    }

    #[test]
    fn test_realtime_has_no_memory() {
        assert!(run(CorrectionMode::Realtime, &[(false, true), (true, true)]));
        assert!(!run(CorrectionMode::Realtime, &[(true, true), (false, false)]));
    }

    #[test]
    fn test_ratio_width() {
        let spec = make_check(
            r#"{"id": "valgus", "type": "ratio_width",
                "numerator_points": [25, 26], "denominator_points": [27, 28], "min": 0.8}"#,
        );
        let knees_out = KeypointFrame::new()
            .with(Joint::LeftKnee, Point::new(100.0, 400.0))
            .with(Joint::RightKnee, Point::new(200.0, 400.0))
            .with(Joint::LeftAnkle, Point::new(100.0, 500.0))
            .with(Joint::RightAnkle, Point::new(200.0, 500.0));
        assert!(eval_check(&spec, &knees_out));

        let knees_in = knees_out
            .clone()
            .with(Joint::LeftKnee, Point::new(130.0, 400.0))
            .with(Joint::RightKnee, Point::new(170.0, 400.0));
        assert!(!eval_check(&spec, &knees_in));
    }

    #[test]
    fn test_missing_inputs_are_good() {
        let spec = make_check(
            r#"{"id": "valgus", "type": "ratio_width",
                "numerator_points": [25, 26], "denominator_points": [27, 28], "min": 0.8}"#,
        );
        assert!(eval_check(&spec, &KeypointFrame::new()));

        let spec = make_check(r#"{"id": "dev", "type": "deviation", "points": [11, 23, 13]}"#);
        assert!(eval_check(&spec, &KeypointFrame::new()));
    }

    #[test]
    fn test_ratio_vertical_dynamic() {
        let spec = make_check(
            r#"{"id": "shrug", "type": "ratio_vertical_dynamic",
                "points": [11, 7], "baseline_var": "neck_len", "min": 0.7}"#,
        );
        let var: DynamicVarSpec =
            serde_json::from_str(r#"{"name": "neck_len", "points": [11, 7]}"#).unwrap();
        let mut cal = DynamicCalibrator::new(&[var]);
        cal.update("neck_len", 100.0, true);

        let frame = KeypointFrame::new()
            .with(Joint::LeftShoulder, Point::new(100.0, 200.0))
            .with(Joint::LeftEar, Point::new(110.0, 140.0));
        let points = PointSet::from_frame(&frame);
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };
        // 60 / 100 < 0.7
        assert!(!check(&spec, &ctx));

        let frame = frame.with(Joint::LeftEar, Point::new(110.0, 110.0));
        let points = PointSet::from_frame(&frame);
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };
        assert!(check(&spec, &ctx));
    }

    #[test]
    fn test_angle_vertical_side_modes() {
        // left forearm vertical, right forearm at 45 degrees
        let frame = KeypointFrame::new()
            .with(Joint::LeftElbow, Point::new(100.0, 200.0))
            .with(Joint::LeftWrist, Point::new(100.0, 100.0))
            .with(Joint::RightElbow, Point::new(300.0, 200.0))
            .with(Joint::RightWrist, Point::new(400.0, 100.0));

        let any = make_check(
            r#"{"id": "forearm", "type": "angle_vertical", "points": [[13, 15], [14, 16]]}"#,
        );
        assert!(!eval_check(&any, &frame));

        let all = make_check(
            r#"{"id": "forearm", "type": "angle_vertical", "points": [[13, 15], [14, 16]], "side_mode": "all"}"#,
        );
        assert!(eval_check(&all, &frame));

        let both_bad = frame.with(Joint::LeftWrist, Point::new(0.0, 100.0));
        assert!(!eval_check(&all, &both_bad));
    }

    #[test]
    fn test_deviation_normalized() {
        let spec = make_check(r#"{"id": "dev", "type": "deviation", "points": [11, 23, 13], "max": 0.1}"#);
        let straight = KeypointFrame::new()
            .with(Joint::LeftShoulder, Point::new(100.0, 100.0))
            .with(Joint::LeftHip, Point::new(100.0, 300.0))
            .with(Joint::LeftElbow, Point::new(110.0, 200.0));
        // 10px off a 200px line = 0.05
        assert!(eval_check(&spec, &straight));

        let bent = straight.with(Joint::LeftElbow, Point::new(150.0, 200.0));
        assert!(!eval_check(&spec, &bent));
    }

    #[test]
    fn test_chain_sync() {
        let spec = make_check(
            r#"{"id": "sync", "type": "chain_sync",
                "metric_1": {"metric": "vertical_diff", "points": [25, 23]},
                "metric_2": {"metric": "vertical_diff", "points": [26, 24]},
                "tolerance": 10}"#,
        );
        let frame = KeypointFrame::new()
            .with(Joint::LeftHip, Point::new(0.0, 300.0))
            .with(Joint::LeftKnee, Point::new(0.0, 400.0))
            .with(Joint::RightHip, Point::new(0.0, 300.0))
            .with(Joint::RightKnee, Point::new(0.0, 405.0));
        assert!(eval_check(&spec, &frame));

        let lagging = frame.with(Joint::RightKnee, Point::new(0.0, 450.0));
        assert!(!eval_check(&spec, &lagging));
    }

    #[test]
    fn test_spine_rounding_reads_fault_flag() {
        let spec = make_check(r#"{"id": "back", "type": "spine_rounding"}"#);
        let points = PointSet::default();
        let cal = DynamicCalibrator::default();
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: true };
        assert!(!check(&spec, &ctx));
        let ctx = FrameContext { spine_fault: false, ..ctx };
        assert!(check(&spec, &ctx));
    }

    #[test]
    fn test_constraint_bounds() {
        let constraint: ConstraintSpec = serde_json::from_str(
            r#"{"metric": "vertical_diff", "points": [0, 11], "min": 10, "max": 50}"#,
        )
        .unwrap();
        let cal = DynamicCalibrator::default();
        for (value, expected) in [(5.0, false), (30.0, true), (60.0, false)] {
            let frame = KeypointFrame::new()
                .with(Joint::LeftShoulder, Point::new(0.0, 100.0))
                .with(Joint::Nose, Point::new(0.0, 100.0 + value));
            let points = PointSet::from_frame(&frame);
            let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: false };
            assert_eq!(constraint_holds(&constraint, &ctx), expected, "value {}", value);
        }
    }

    fn make_evaluator(suppress: bool) -> ConditionEvaluator {
        let spec: EvaluationSpec = serde_json::from_str(&format!(
            r#"{{
                "state_machine": {{
                    "trigger_down": {{"metric": "vertical_diff", "points": [0, 11], "threshold": 50}},
                    "trigger_up":   {{"metric": "vertical_diff", "points": [0, 11], "threshold": 10}}
                }},
                "conditions": [
                    {{"id": "depth", "type": "spine_rounding", "priority": 2, "correction_mode": "latch_fail"}},
                    {{"id": "back", "type": "spine_rounding", "priority": 1, "correction_mode": "latch_fail"}},
                    {{"id": "extra", "type": "spine_rounding", "correction_mode": "latch_fail"}}
                ],
                "logic_control": {{"suppress_lower_priority": {suppress}}}
            }}"#
        ))
        .unwrap();
        ConditionEvaluator::new(&spec, 99)
    }

    fn faulted_frame(evaluator: &mut ConditionEvaluator, fault: bool, phase: Phase) -> ConditionVerdicts {
        let points = PointSet::default();
        let cal = DynamicCalibrator::default();
        let ctx = FrameContext { points: &points, calibrator: &cal, spine_fault: fault };
        evaluator.evaluate(&ctx, phase)
    }

    #[test]
    fn test_suppression_keeps_highest_priority_failure() {
        let mut evaluator = make_evaluator(true);
        let verdicts = faulted_frame(&mut evaluator, true, Phase::Active);
        assert_eq!(verdicts[&ConditionId::from("back")], false);
        assert_eq!(verdicts[&ConditionId::from("depth")], true);
        assert_eq!(verdicts[&ConditionId::from("extra")], true);
        assert_eq!(evaluator.rep_verdicts()[&ConditionId::from("depth")], true);
    }

    #[test]
    fn test_without_suppression_all_fail() {
        let mut evaluator = make_evaluator(false);
        let verdicts = faulted_frame(&mut evaluator, true, Phase::Active);
        assert!(verdicts.values().all(|good| !good));
    }

    #[test]
    fn test_rep_verdicts_only_recorded_while_active() {
        let mut evaluator = make_evaluator(false);
        faulted_frame(&mut evaluator, true, Phase::Start);
        assert!(evaluator.rep_verdicts().values().all(|good| *good));

        evaluator.begin_rep();
        faulted_frame(&mut evaluator, true, Phase::Active);
        faulted_frame(&mut evaluator, false, Phase::Active);
        // latch_fail: the fault sticks
        assert!(evaluator.rep_verdicts().values().all(|good| !good));

        evaluator.begin_rep();
        assert!(evaluator.rep_verdicts().values().all(|good| *good));
    }

    #[test]
    fn test_default_priority_applied() {
        let evaluator = make_evaluator(false);
        let order: Vec<&str> = evaluator.by_priority().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["back", "depth", "extra"]);
        assert_eq!(evaluator.get(&ConditionId::from("extra")).unwrap().priority, 99);
    }
}

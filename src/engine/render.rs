use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::{Condition, ConditionVerdicts};
use crate::geometry::Point;
use crate::pose::PointSet;
use crate::spec::{
    ConditionId, DisplayMode, DrawTemplate, ElementSpec, ExerciseSpec, IconKind, ShapeTemplate,
    StyleSpec,
};

/// Semantic color; the caller maps it to an actual color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRole {
    Good,
    Bad,
    #[default]
    Neutral,
    Accent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dash,
}

/// Emitted at most once per rep end; ordered by precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundEvent {
    Count,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawDirective {
    Line {
        start: Point,
        end: Point,
        role: ColorRole,
        style: LineStyle,
        width: f32,
    },
    Arrow {
        start: Point,
        end: Point,
        role: ColorRole,
        /// Pixels left free at the target end
        gap: f32,
    },
    Circle {
        center: Point,
        radius: f32,
        role: ColorRole,
        filled: bool,
    },
    Check {
        center: Point,
        role: ColorRole,
        scale: f32,
    },
    Polyline {
        points: Vec<Point>,
        role: ColorRole,
        style: LineStyle,
        width: f32,
    },
}

struct ResolvedStyle {
    role: ColorRole,
    dashed: bool,
    width: Option<f32>,
}

/// Turns element templates into draw directives for the current frame
#[derive(Debug, Clone)]
pub struct ElementRenderer {
    elements: Vec<ElementSpec>,
    styles: BTreeMap<String, StyleSpec>,
    display_mode: DisplayMode,
}

impl ElementRenderer {
    pub fn new(spec: &ExerciseSpec) -> Self {
        Self {
            elements: spec.elements.clone(),
            styles: spec.styles.clone(),
            display_mode: spec.evaluation.logic_control.display_mode,
        }
    }

    /// `active` is the set of conditions currently surfaced to the user; `verdicts` the
    /// good/bad state to draw them with. `by_priority` orders the exclusive pick.
    pub fn render(
        &self,
        points: &PointSet,
        active: &[ConditionId],
        verdicts: &ConditionVerdicts,
        by_priority: &[&Condition],
    ) -> Vec<DrawDirective> {
        let is_good = |id: &ConditionId| verdicts.get(id).copied().unwrap_or(true);

        let shown: Option<&ConditionId> = match self.display_mode {
            DisplayMode::All => None,
            DisplayMode::Exclusive => {
                let candidates = || {
                    by_priority
                        .iter()
                        .map(|c| &c.id)
                        .filter(|id| active.contains(*id))
                };
                candidates()
                    .find(|id| !is_good(*id))
                    .or_else(|| candidates().next())
            }
        };

        let mut out = Vec::new();
        for element in &self.elements {
            let template = match element {
                ElementSpec::Always(template) => Some(template),
                ElementSpec::Conditional {
                    condition_ref,
                    on_good,
                    on_bad,
                } => {
                    if !active.contains(condition_ref) {
                        continue;
                    }
                    if shown.is_some_and(|id| id != condition_ref) {
                        continue;
                    }
                    if is_good(condition_ref) {
                        on_good.as_ref()
                    } else {
                        on_bad.as_ref()
                    }
                }
            };
            if let Some(directive) = template.and_then(|t| self.draw(t, points)) {
                out.push(directive);
            }
        }
        out
    }

    fn resolve_style(&self, key: Option<&str>) -> ResolvedStyle {
        if let Some(style) = key.and_then(|k| self.styles.get(k)) {
            return ResolvedStyle {
                role: style.color,
                dashed: style.dashed,
                width: style.width,
            };
        }
        let role = match key {
            Some("good") => ColorRole::Good,
            Some("bad") => ColorRole::Bad,
            _ => ColorRole::Neutral,
        };
        ResolvedStyle {
            role,
            dashed: false,
            width: None,
        }
    }

    /// `None` when a referenced point is absent this frame
    fn draw(&self, template: &DrawTemplate, points: &PointSet) -> Option<DrawDirective> {
        let style = self.resolve_style(template.style_key.as_deref());
        let line_style = |dashed: bool| {
            if dashed || style.dashed {
                LineStyle::Dash
            } else {
                LineStyle::Solid
            }
        };

        Some(match &template.shape {
            ShapeTemplate::Line {
                from,
                to,
                width,
                is_dashed,
            } => DrawDirective::Line {
                start: points.get(*from)?,
                end: points.get(*to)?,
                role: style.role,
                style: line_style(*is_dashed),
                width: style.width.unwrap_or(*width),
            },
            ShapeTemplate::Arrow {
                from,
                to,
                direction,
                length,
                gap,
            } => {
                let start = points.get(*from)?;
                match (to, direction) {
                    (Some(to), _) => DrawDirective::Arrow {
                        start,
                        end: points.get(*to)?,
                        role: style.role,
                        gap: *gap,
                    },
                    (None, Some([dx, dy])) => {
                        let dir = Point::new(*dx, *dy);
                        let norm = dir.length();
                        if norm <= f32::EPSILON {
                            return None;
                        }
                        DrawDirective::Arrow {
                            start,
                            end: start + dir * (*length / norm),
                            role: style.role,
                            gap: 0.0,
                        }
                    }
                    (None, None) => return None,
                }
            }
            ShapeTemplate::Circle {
                center,
                radius,
                filled,
            } => DrawDirective::Circle {
                center: points.get(*center)?,
                radius: *radius,
                role: style.role,
                filled: *filled,
            },
            ShapeTemplate::Icon {
                center,
                icon_name: IconKind::Check,
                scale,
            } => DrawDirective::Check {
                center: points.get(*center)?,
                role: style.role,
                scale: *scale,
            },
            ShapeTemplate::Polyline { points: ids, width } => DrawDirective::Polyline {
                points: points.get_all(ids)?,
                role: style.role,
                style: line_style(false),
                width: style.width.unwrap_or(*width),
            },
        })
    }
}

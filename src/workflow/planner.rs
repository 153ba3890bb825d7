//! Execution Planner
//!
//! Splits a flow's step list into the units the orchestrator runs:
//! - Sequential steps, executed one at a time against the live context
//! - Parallel groups, maximal runs of contiguous `parallel: true` steps,
//!   executed fork-join against a snapshot
//!
//! Declared order is preserved both across and within segments.

use log::debug;

use super::model::FlowStep;

/// One unit of flow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Index of a single step
    Sequential(usize),
    /// Half-open range of step indices that run as one group
    Parallel { start: usize, end: usize },
}

impl Segment {
    /// Number of steps covered by this segment.
    pub fn len(&self) -> usize {
        match self {
            Self::Sequential(_) => 1,
            Self::Parallel { start, end } => end - start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plans the execution segments of a step list.
pub fn plan_segments(steps: &[FlowStep]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut i = 0;

    while i < steps.len() {
        if steps[i].parallel {
            let start = i;
            while i < steps.len() && steps[i].parallel {
                i += 1;
            }
            debug!(
                "Parallel group: {:?}",
                steps[start..i].iter().map(|s| &s.id).collect::<Vec<_>>()
            );
            segments.push(Segment::Parallel { start, end: i });
        } else {
            segments.push(Segment::Sequential(i));
            i += 1;
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(spec: &[(&str, bool)]) -> Vec<FlowStep> {
        spec.iter()
            .map(|(id, parallel)| {
                let step = FlowStep::new(*id, "noop");
                if *parallel {
                    step.in_parallel()
                } else {
                    step
                }
            })
            .collect()
    }

    #[test]
    fn test_empty() {
        assert!(plan_segments(&[]).is_empty());
    }

    #[test]
    fn test_all_sequential() {
        let plan = plan_segments(&steps(&[("a", false), ("b", false)]));
        assert_eq!(plan, vec![Segment::Sequential(0), Segment::Sequential(1)]);
    }

    #[test]
    fn test_groups_contiguous_parallel_steps() {
        let plan = plan_segments(&steps(&[
            ("a", false),
            ("b", true),
            ("c", true),
            ("d", false),
            ("e", true),
        ]));
        assert_eq!(
            plan,
            vec![
                Segment::Sequential(0),
                Segment::Parallel { start: 1, end: 3 },
                Segment::Sequential(3),
                Segment::Parallel { start: 4, end: 5 },
            ]
        );
        assert_eq!(plan[1].len(), 2);
    }

    #[test]
    fn test_segments_cover_every_step_once() {
        let input = steps(&[("a", true), ("b", true), ("c", false), ("d", true)]);
        let total: usize = plan_segments(&input).iter().map(Segment::len).sum();
        assert_eq!(total, input.len());
    }
}

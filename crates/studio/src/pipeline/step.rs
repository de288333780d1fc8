/// Stages a job passes through, one per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Idle,
    LoadSubjectAsset,
    InstantiateSubject,
    ApplySubjectParameters,
    AttachToScene,
    AwaitStabilization,
    PositionCamera,
    Render,
    CaptureFrame,
    PersistResult,
    Cleanup,
}

/// What a step reported after running for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step finished; move to its successor.
    Advance,
    /// Step needs more ticks (waiting on a worker, a simulation or the queue).
    Stay,
    /// The requested scene is already loaded and instanced.
    SceneReused,
    /// The job failed; the pipeline cleans up before idling.
    Failed,
}

impl Step {
    pub const ALL: [Step; 11] = [
        Step::Idle,
        Step::LoadSubjectAsset,
        Step::InstantiateSubject,
        Step::ApplySubjectParameters,
        Step::AttachToScene,
        Step::AwaitStabilization,
        Step::PositionCamera,
        Step::Render,
        Step::CaptureFrame,
        Step::PersistResult,
        Step::Cleanup,
    ];

    pub fn successor(self) -> Step {
        match self {
            Step::Idle => Step::LoadSubjectAsset,
            Step::LoadSubjectAsset => Step::InstantiateSubject,
            Step::InstantiateSubject => Step::ApplySubjectParameters,
            Step::ApplySubjectParameters => Step::AttachToScene,
            Step::AttachToScene => Step::AwaitStabilization,
            Step::AwaitStabilization => Step::PositionCamera,
            Step::PositionCamera => Step::Render,
            Step::Render => Step::CaptureFrame,
            Step::CaptureFrame => Step::PersistResult,
            Step::PersistResult => Step::Cleanup,
            Step::Cleanup => Step::Idle,
        }
    }

    /// Total over every `(step, outcome)` pair.
    pub fn transition(self, outcome: StepOutcome) -> Step {
        match (self, outcome) {
            (step, StepOutcome::Stay) => step,
            (Step::Idle, StepOutcome::Failed) => Step::Idle,
            (Step::Cleanup, StepOutcome::Failed) => Step::Idle,
            (_, StepOutcome::Failed) => Step::Cleanup,
            (Step::LoadSubjectAsset, StepOutcome::SceneReused) => Step::ApplySubjectParameters,
            (step, StepOutcome::SceneReused | StepOutcome::Advance) => step.successor(),
        }
    }

    /// True while a job is owned by the pipeline.
    pub fn is_busy(self) -> bool {
        self != Step::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTCOMES: [StepOutcome; 4] = [
        StepOutcome::Advance,
        StepOutcome::Stay,
        StepOutcome::SceneReused,
        StepOutcome::Failed,
    ];

    #[test]
    fn advancing_from_idle_visits_every_step_once() {
        let mut visited = vec![Step::Idle];
        let mut step = Step::Idle.transition(StepOutcome::Advance);
        while step != Step::Idle {
            visited.push(step);
            step = step.transition(StepOutcome::Advance);
        }
        assert_eq!(visited, Step::ALL.to_vec());
    }

    #[test]
    fn every_pair_has_a_defined_target() {
        for step in Step::ALL {
            for outcome in OUTCOMES {
                let next = step.transition(outcome);
                assert!(Step::ALL.contains(&next), "{step:?} {outcome:?}");
            }
        }
    }

    #[test]
    fn stay_never_moves() {
        for step in Step::ALL {
            assert_eq!(step.transition(StepOutcome::Stay), step);
        }
    }

    #[test]
    fn scene_reuse_skips_instantiation() {
        assert_eq!(
            Step::LoadSubjectAsset.transition(StepOutcome::SceneReused),
            Step::ApplySubjectParameters
        );
        assert_eq!(
            Step::Render.transition(StepOutcome::SceneReused),
            Step::CaptureFrame
        );
    }

    #[test]
    fn failure_routes_through_cleanup() {
        for step in Step::ALL {
            let next = step.transition(StepOutcome::Failed);
            match step {
                Step::Idle | Step::Cleanup => assert_eq!(next, Step::Idle),
                _ => assert_eq!(next, Step::Cleanup),
            }
        }
    }
}

use crate::config::MAX_STEP_DEPTH;
use crate::events::TestStep;

use super::StepSummary;

/// Convert runner steps into summaries, dropping everything at or below
/// `MAX_STEP_DEPTH`. Call with `level = 0` for the root list.
pub fn capture_steps(steps: &[TestStep], level: usize) -> Vec<StepSummary> {
    if steps.is_empty() || level >= MAX_STEP_DEPTH {
        return Vec::new();
    }

    steps
        .iter()
        .map(|step| StepSummary {
            name: step.title.clone(),
            duration: step.duration,
            location: step.location.clone(),
            error: step.error.is_some(),
            steps: capture_steps(&step.steps, level + 1),
        })
        .collect()
}

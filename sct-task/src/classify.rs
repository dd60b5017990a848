use sct_core::{KeyClass, TrialKind, TrialSpec};

/// Task-dependent correctness. Go trials need the key matching the cue
/// direction. Interrupt trials accept only the change key; a directional
/// press is wrong even when the change cue never appeared, and wrong
/// even when it matches the plane. No response is never correct.
pub fn classify(spec: &TrialSpec, key: Option<KeyClass>) -> bool {
    let Some(key) = key else {
        return false;
    };
    match spec.kind {
        TrialKind::Go => key.matches(spec.direction),
        TrialKind::Interrupt => key == KeyClass::Change,
    }
}

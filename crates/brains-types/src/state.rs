//! The authoritative run state: `∅` plus every completed step's patch, applied in order.
//!
//! A step's only permitted effect on state is the JSON-patch delta it returns; `State`
//! exists to make that invariant a type rather than a convention.

use crate::error::{Result, TypesError};
use json_patch::{diff, patch, Patch};
use serde_json::Value;

/// JSON state threaded through a run. Always an object or null; steps are pure
/// functions from `State` to `(State, Patch)`.
pub type State = Value;

/// The empty state every run starts from absent an explicit initial-state override.
pub fn empty_state() -> State {
    Value::Object(serde_json::Map::new())
}

/// Compute the structural diff between a step's pre- and post-state, restricted to
/// `add, remove, replace, move, copy, test` per the JSON-patch dialect in use here.
pub fn diff_state(before: &State, after: &State) -> Patch {
    diff(before, after)
}

/// Apply a single patch to a state snapshot, returning the new state.
///
/// Patches are produced by `diff_state` and are therefore expected to apply cleanly;
/// a failure here means the durable log and the in-memory state have diverged.
pub fn apply_patch(state: &State, p: &Patch) -> Result<State> {
    let mut next = state.clone();
    patch(&mut next, p).map_err(|e| TypesError::PatchApply(e.to_string()))?;
    Ok(next)
}

/// Fold an ordered sequence of patches over an initial state. This is the sole
/// mechanism by which durable state is reconstructed from the event log.
pub fn fold_patches<'a>(initial: State, patches: impl IntoIterator<Item = &'a Patch>) -> Result<State> {
    let mut state = initial;
    for p in patches {
        state = apply_patch(&state, p)?;
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_and_apply_roundtrip() {
        let before = json!({"count": 0});
        let after = json!({"count": 1});
        let p = diff_state(&before, &after);
        let result = apply_patch(&before, &p).unwrap();
        assert_eq!(result, after);
    }

    #[test]
    fn fold_patches_is_sequential() {
        let p1 = diff_state(&json!({"count": 0}), &json!({"count": 1}));
        let p2 = diff_state(&json!({"count": 1}), &json!({"count": 1, "value": "TEST"}));
        let result = fold_patches(json!({"count": 0}), [&p1, &p2]).unwrap();
        assert_eq!(result, json!({"count": 1, "value": "TEST"}));
    }

    #[test]
    fn empty_state_is_empty_object() {
        assert_eq!(empty_state(), json!({}));
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tempfile::tempdir;

use super::*;
use crate::state::StateStore;

#[test]
fn fresh_rotation_follows_pattern() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let machine = RotationMachine::new(&store, 2);

    let expected = [Mode::Build, Mode::Build, Mode::Build, Mode::Reflect, Mode::Engage];
    let mut state = machine.read("BBBRE")?;
    let mut last_outcome = None;

    for (i, expected_mode) in expected.iter().enumerate() {
        let (new_state, advanced) = machine.advance(state, last_outcome, None)?;
        assert_eq!(advanced.mode, *expected_mode, "tick {}", i + 1);
        assert_eq!(advanced.session_counter, (i + 1) as u64);
        state = new_state;
        last_outcome = Some(Outcome::Success);
    }
    Ok(())
}

#[test]
fn timeout_retries_same_mode_then_advances() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let machine = RotationMachine::new(&store, 1);

    let state = machine.read("BBBRE")?;
    // Tick 1: fresh, no previous outcome.
    let (state, tick1) = machine.advance(state, None, None)?;
    assert_eq!(tick1.mode, Mode::Build);

    // Tick 2: tick 1 timed out — same mode, retry_count bumps to 1.
    let (state, tick2) = machine.advance(state, Some(Outcome::Timeout), None)?;
    assert_eq!(tick2.mode, tick1.mode);
    assert_eq!(tick2.retry_count, 1);

    // Tick 3: tick 2 succeeded — advances past the retry.
    let (_state, tick3) = machine.advance(state, Some(Outcome::Success), None)?;
    assert_eq!(tick3.mode, Mode::Build);
    assert_eq!(tick3.retry_count, 0);
    Ok(())
}

#[test]
fn retry_count_caps_at_max_then_advances_anyway() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let machine = RotationMachine::new(&store, 1);

    let state = machine.read("BR")?;
    let (state, tick1) = machine.advance(state, None, None)?;
    assert_eq!(tick1.mode, Mode::Build);

    let (state, tick2) = machine.advance(state, Some(Outcome::Timeout), None)?;
    assert_eq!(tick2.mode, Mode::Build);
    assert_eq!(tick2.retry_count, 1);

    // retry_count (1) is no longer < max_retries (1), so this advances
    // even though the previous outcome was another timeout.
    let (_state, tick3) = machine.advance(state, Some(Outcome::Timeout), None)?;
    assert_eq!(tick3.mode, Mode::Reflect);
    assert_eq!(tick3.retry_count, 0);
    Ok(())
}

#[test]
fn override_selects_mode_without_advancing_index() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let machine = RotationMachine::new(&store, 2);

    let state = machine.read("BE")?;
    let index_before = state.rotation_index;
    let (state, overridden) = machine.advance(state, None, Some(Mode::Audit))?;
    assert_eq!(overridden.mode, Mode::Audit);
    assert!(overridden.overridden);
    assert_eq!(state.rotation_index, index_before);
    assert_eq!(overridden.session_counter, 1);

    // The next non-override tick resumes from the un-advanced index.
    let (_state, next) = machine.advance(state, None, None)?;
    assert_eq!(next.mode, Mode::Build);
    Ok(())
}

#[test]
fn empty_pattern_is_config_invalid() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let machine = RotationMachine::new(&store, 2);
    let state = machine.read("")?;
    let result = machine.advance(state, None, None);
    assert!(result.is_err());
    Ok(())
}

proptest::proptest! {
    #[test]
    fn kth_tick_matches_pattern_when_no_retries(seed in 0usize..20) {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let machine = RotationMachine::new(&store, 0);
        let pattern = "BERA";
        let letters: Vec<char> = pattern.chars().collect();

        let mut state = machine.read(pattern).unwrap();
        let mut last_outcome = None;
        for k in 0..seed {
            let (new_state, advanced) = machine.advance(state, last_outcome, None).unwrap();
            let expected = Mode::from_letter(letters[k % letters.len()]).unwrap();
            assert_eq!(advanced.mode, expected);
            state = new_state;
            last_outcome = Some(Outcome::Success);
        }
    }
}

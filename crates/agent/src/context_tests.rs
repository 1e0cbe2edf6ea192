// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tempfile::tempdir;

use super::*;
use crate::state::StateStore;
use crate::work_queue::{Complexity, Status, WorkItem};

#[test]
fn build_is_pure_given_same_inputs_outside_auto_promote() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let builder = ContextBuilder::new(&store, Knobs::default());

    let first = builder.build(Mode::Audit, 3, std::collections::HashMap::new(), None, None);
    let second = builder.build(Mode::Audit, 3, std::collections::HashMap::new(), None, None);

    let first_json = serde_json::to_string(&first)?;
    let second_json = serde_json::to_string(&second)?;
    assert_eq!(first_json, second_json);
    Ok(())
}

#[test]
fn build_mode_assigns_the_next_ready_work_item() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let work_queue = WorkQueue::new(&store);
    work_queue.add(WorkItem {
        id: String::new(),
        title: "Ship the release notes".to_string(),
        description: String::new(),
        status: Status::Pending,
        priority: 1,
        complexity: Complexity::M,
        tags: Vec::new(),
        source: "manual".to_string(),
        deps: Vec::new(),
        created_session: 1,
        progress_notes: Vec::new(),
    })?;

    let builder = ContextBuilder::new(&store, Knobs::default());
    let context = builder.build(Mode::Build, 2, std::collections::HashMap::new(), None, None);
    assert!(context.assigned_task.is_some());
    assert_eq!(context.assigned_task.unwrap().title, "Ship the release notes");
    Ok(())
}

#[test]
fn engage_mode_has_no_assigned_task() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let builder = ContextBuilder::new(&store, Knobs::default());
    let context = builder.build(Mode::Engage, 2, std::collections::HashMap::new(), None, None);
    assert!(context.assigned_task.is_none());
    Ok(())
}

#[test]
fn build_mode_auto_promotes_from_idea_pool_when_queue_empty() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    store.append_line("ideas.md", "- **Add a changelog generator**: nice", None)?;
    store.append_line("ideas.md", "- **Write a migration guide**: also nice", None)?;

    let builder = ContextBuilder::new(&store, Knobs::default());
    let context = builder.build(Mode::Build, 1, std::collections::HashMap::new(), None, None);
    assert_eq!(context.brainstorming_seeded.len(), 1);
    assert!(context.assigned_task.is_some());
    Ok(())
}

#[test]
fn rotation_section_carries_per_type_counter() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path());
    let builder = ContextBuilder::new(&store, Knobs::default());
    let mut history_counts = std::collections::HashMap::new();
    history_counts.insert(Mode::Build, 4);

    let context = builder.build(Mode::Build, 5, history_counts, None, None);
    assert_eq!(context.rotation.per_type_counter.get("build"), Some(&4));
    assert_eq!(context.rotation.counter, 5);
    Ok(())
}

//! Subcommand implementations.
//!
//! Every command reads the document through [`ConfigStore::load`], so a
//! damaged primary file is recovered the same way the runtime does it.
//! Mutations go through a [`ConfigWriter`] and are drained before returning.

use std::io::Write;

use anyhow::{Context, Result};
use instances_core::PersistedState;
use instances_store::{ConfigStore, ConfigWriter};
use serde_json::json;
use tracing::info;

/// Print the whole document.
pub fn show(store: &ConfigStore, out: &mut impl Write) -> Result<()> {
    let loaded = store.load();
    info!(source = ?loaded.source, "document loaded");
    let doc = loaded
        .state
        .to_document()
        .context("failed to serialize document")?;
    writeln!(out, "{doc}")?;
    Ok(())
}

/// List recent sessions, most recent first.
pub fn history(store: &ConfigStore, as_json: bool, out: &mut impl Write) -> Result<()> {
    let state = store.load().state;
    if as_json {
        let rows: Vec<_> = state
            .recent_sessions
            .iter()
            .map(|r| {
                json!({
                    "sessionId": r.session_id,
                    "worldId": r.world_id,
                    "name": r.display_name,
                    "worldImageUrl": r.world_image_url,
                    "last": state.last_session_id() == Some(r.session_id.as_str()),
                })
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }

    if state.recent_sessions.is_empty() {
        writeln!(out, "no recent sessions")?;
        return Ok(());
    }
    for record in &state.recent_sessions {
        let marker = if state.last_session_id() == Some(record.session_id.as_str()) {
            '*'
        } else {
            ' '
        };
        writeln!(
            out,
            "{marker} {}  {}  ({})",
            record.session_id, record.display_name, record.world_id
        )?;
    }
    Ok(())
}

/// Invalidate one session. Returns whether anything changed.
pub fn forget(store: &ConfigStore, session_id: &str, out: &mut impl Write) -> Result<bool> {
    let mut state = store.load().state;
    let changed = state.invalidate_session(session_id);
    if changed {
        persist(store, &state)?;
        writeln!(out, "forgot {session_id}")?;
    } else {
        writeln!(out, "{session_id} is not in the document")?;
    }
    Ok(changed)
}

/// Apply the history bound. Returns how many entries were dropped.
pub fn trim(store: &ConfigStore, max: usize, out: &mut impl Write) -> Result<usize> {
    let mut state = store.load().state;
    let dropped = state.apply_history_limit(max);
    if dropped > 0 {
        persist(store, &state)?;
    }
    writeln!(out, "dropped {dropped} entries, keeping at most {max}")?;
    Ok(dropped)
}

/// Replace the document with a default one.
pub fn reset(store: &ConfigStore, out: &mut impl Write) -> Result<()> {
    persist(store, &PersistedState::default())?;
    writeln!(out, "reset {}", store.primary_path().display())?;
    Ok(())
}

fn persist(store: &ConfigStore, state: &PersistedState) -> Result<()> {
    let writer = ConfigWriter::spawn(store.clone()).context("failed to start config writer")?;
    writer.save(state).context("failed to queue write")?;
    writer.flush().context("failed to flush writes")?;
    writer.shutdown();

    let health = writer.health();
    if !health.healthy {
        anyhow::bail!(
            "write to {} failed: {}",
            store.dir().display(),
            health.last_error.unwrap_or_default()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use instances_core::SessionRecord;

    use super::*;

    fn seeded(ids: &[&str]) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let mut state = PersistedState::default();
        for id in ids {
            state.record_session(SessionRecord::new(*id, "w", format!("{id} name")), 10);
        }
        store.save_now(&state).unwrap();
        (dir, store)
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn show_prints_legacy_field_names() {
        let (_dir, store) = seeded(&["s1"]);
        let mut buf = Vec::new();
        show(&store, &mut buf).unwrap();
        let text = output(buf);
        assert!(text.contains("\"LastInstance\""));
        assert!(text.contains("\"InstanceId\": \"s1\""));
    }

    #[test]
    fn history_marks_last_session() {
        let (_dir, store) = seeded(&["old", "new"]);
        let mut buf = Vec::new();
        history(&store, false, &mut buf).unwrap();
        let text = output(buf);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("* new"));
        assert!(lines[1].starts_with("  old"));
    }

    #[test]
    fn history_json_lists_every_entry() {
        let (_dir, store) = seeded(&["a", "b"]);
        let mut buf = Vec::new();
        history(&store, true, &mut buf).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[0]["sessionId"], "b");
        assert_eq!(rows[0]["last"], true);
    }

    #[test]
    fn empty_history_says_so() {
        let (_dir, store) = seeded(&[]);
        let mut buf = Vec::new();
        history(&store, false, &mut buf).unwrap();
        assert_eq!(output(buf).trim(), "no recent sessions");
    }

    #[test]
    fn forget_persists_invalidation() {
        let (_dir, store) = seeded(&["a", "b"]);
        assert!(forget(&store, "b", &mut Vec::new()).unwrap());

        let state = store.load().state;
        assert!(state.last_session.is_none());
        assert_eq!(state.recent_sessions.len(), 1);
        assert!(!forget(&store, "b", &mut Vec::new()).unwrap());
    }

    #[test]
    fn trim_drops_oldest() {
        let (_dir, store) = seeded(&["a", "b", "c"]);
        assert_eq!(trim(&store, 1, &mut Vec::new()).unwrap(), 2);

        let state = store.load().state;
        assert_eq!(state.recent_sessions.len(), 1);
        assert_eq!(state.recent_sessions[0].session_id, "c");
    }

    #[test]
    fn reset_writes_default_document_to_both_files() {
        let (_dir, store) = seeded(&["a"]);
        reset(&store, &mut Vec::new()).unwrap();

        assert_eq!(store.load().state, PersistedState::default());
        let primary = std::fs::read_to_string(store.primary_path()).unwrap();
        let staging = std::fs::read_to_string(store.staging_path()).unwrap();
        assert_eq!(primary, staging);
    }

    #[test]
    fn failed_write_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = ConfigStore::new(&blocker);

        assert!(reset(&store, &mut Vec::new()).is_err());
    }
}

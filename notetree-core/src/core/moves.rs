//! Relocating a note within its sibling group or under a new parent.
//!
//! A move runs in three phases inside one write transaction:
//!
//! 1. **Park**: the note's sequence is set past every sequence in the
//!    project, taking it out of the range that phase 2 rewrites.
//! 2. **Shift**: neighbours are shifted by one to close the old slot and
//!    open the new one (see [`shift_plan`]).
//! 3. **Place**: the note takes its new parent and sequence.
//!
//! Positions are ranks within a group. Before parking, an affected group that
//! is not `{1..N}` (for example after a deletion left a gap) is renumbered by
//! the normalizer, so the shifts below operate on dense sequences. Each
//! affected group is checked again after the place phase; duplicates abort
//! the move with [`NoteTreeError::ConstraintViolation`].

use crate::core::{normalize, order};
use crate::{EngineConfig, NoteTreeError, OrderEntry, Result};
use log::{debug, error, warn};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::collections::HashSet;

/// What a successful move did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MoveOutcome {
    /// The note was already at the requested slot; nothing was written.
    Unchanged,
    Moved {
        from: OrderEntry,
        to_parent: Option<String>,
        to_sequence: i64,
        /// Groups the repair pass had to renumber.
        repaired_groups: usize,
    },
}

/// One range shift within a group: every sequence in `[lower, upper]` gets `delta`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Shift {
    parent_id: Option<String>,
    lower: i64,
    upper: Option<i64>,
    delta: i64,
}

/// Moves `note_id` to `requested_position` (1-based) under `new_parent_id`.
///
/// Must be called inside an IMMEDIATE transaction; the caller commits.
pub(crate) fn move_in_tx(
    conn: &Connection,
    config: &EngineConfig,
    note_id: &str,
    new_parent_id: Option<&str>,
    requested_position: i64,
) -> Result<MoveOutcome> {
    let entry = order::get_entry(conn, note_id)?;
    let project_id = entry.project_id.clone();

    if let Some(parent) = new_parent_id {
        ensure_parent_in_project(conn, &project_id, parent)?;
        ensure_not_descendant(conn, &project_id, note_id, parent)?;
    }

    let same_parent = entry.parent_id.as_deref() == new_parent_id;
    let target = clamp_position(
        requested_position,
        order::group_size(conn, &project_id, new_parent_id)?,
        same_parent,
    );
    if target != requested_position {
        debug!(
            "event=note_move module=moves status=clamped note={note_id} requested={requested_position} target={target}"
        );
    }

    // Either the stored sequence or the rank names the current slot.
    if same_parent
        && (requested_position == entry.sequence || target == current_rank(conn, &entry)?)
    {
        debug!("event=note_move module=moves status=noop note={note_id} position={target}");
        return Ok(MoveOutcome::Unchanged);
    }

    // Positions are ranks, so both groups must be {1..N} before shifting.
    let mut affected = vec![entry.parent_id.clone()];
    if !same_parent {
        affected.push(new_parent_id.map(str::to_string));
    }
    let mut repaired_groups = 0;
    for parent in &affected {
        if close_group(conn, config, &project_id, parent.as_deref())? {
            repaired_groups += 1;
        }
    }
    let entry = if repaired_groups > 0 {
        order::get_entry(conn, note_id)?
    } else {
        entry
    };

    // Park
    let sentinel = park_sentinel(conn, &project_id)?;
    conn.execute(
        "UPDATE note_order SET sequence = ?2 WHERE note_id = ?1",
        rusqlite::params![note_id, sentinel],
    )
    .map_err(|e| constraint_error(e, &project_id, entry.parent_id.as_deref()))?;

    // Shift
    for shift in shift_plan(entry.parent_id.as_deref(), entry.sequence, new_parent_id, target) {
        order::shift_range(
            conn,
            &project_id,
            shift.parent_id.as_deref(),
            shift.lower,
            shift.upper,
            shift.delta,
            note_id,
        )
        .map_err(|e| as_constraint_violation(e, &project_id, shift.parent_id.as_deref()))?;
    }

    // Place
    let now = chrono::Utc::now().timestamp();
    order::set_position(conn, note_id, new_parent_id, target)
        .map_err(|e| as_constraint_violation(e, &project_id, new_parent_id))?;
    conn.execute(
        "UPDATE notes SET parent_id = ?2, updated_at = ?3 WHERE id = ?1",
        rusqlite::params![note_id, new_parent_id, now],
    )?;

    for parent in &affected {
        if repair_group(conn, config, &project_id, parent.as_deref())? {
            repaired_groups += 1;
        }
    }

    conn.execute(
        "UPDATE projects SET modified_at = ?2 WHERE id = ?1",
        rusqlite::params![project_id, now],
    )?;

    Ok(MoveOutcome::Moved {
        to_parent: new_parent_id.map(str::to_string),
        to_sequence: target,
        from: entry,
        repaired_groups,
    })
}

/// The 1-based position of `entry` within its group, in normalized order.
fn current_rank(conn: &Connection, entry: &OrderEntry) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) + 1 FROM note_order
         WHERE project_id = ?1 AND parent_id IS ?2
           AND (sequence < ?3 OR (sequence = ?3 AND note_id < ?4))",
        rusqlite::params![entry.project_id, entry.parent_id, entry.sequence, entry.note_id],
        |row| row.get(0),
    )?)
}

/// Clamps a requested 1-based position into the valid range of the target group.
///
/// A note moving within its own group can take any slot `1..=size`; a note
/// arriving from another group can also take the new last slot `size + 1`.
fn clamp_position(requested: i64, target_group_size: i64, same_parent: bool) -> i64 {
    let max_valid = if same_parent {
        target_group_size
    } else {
        target_group_size + 1
    };
    requested.clamp(1, max_valid.max(1))
}

/// The neighbour shifts needed to move from `(old_parent, old)` to `(new_parent, new)`.
fn shift_plan(
    old_parent: Option<&str>,
    old: i64,
    new_parent: Option<&str>,
    new: i64,
) -> Vec<Shift> {
    let shift = |parent: Option<&str>, lower, upper, delta| Shift {
        parent_id: parent.map(str::to_string),
        lower,
        upper,
        delta,
    };
    if old_parent == new_parent {
        if old < new {
            vec![shift(new_parent, old + 1, Some(new), -1)]
        } else if old > new {
            vec![shift(new_parent, new, Some(old - 1), 1)]
        } else {
            Vec::new()
        }
    } else {
        vec![
            shift(old_parent, old + 1, None, -1),
            shift(new_parent, new, None, 1),
        ]
    }
}

/// A sequence strictly greater than any that can exist in the project.
fn park_sentinel(conn: &Connection, project_id: &str) -> Result<i64> {
    let entries = conn.query_row(
        "SELECT COUNT(*) FROM note_order WHERE project_id = ?1",
        [project_id],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(order::max_sequence_in_project(conn, project_id)?.max(entries) + 1)
}

fn ensure_parent_in_project(conn: &Connection, project_id: &str, parent_id: &str) -> Result<()> {
    let parent_project: Option<String> = conn
        .query_row(
            "SELECT project_id FROM notes WHERE id = ?1",
            [parent_id],
            |row| row.get(0),
        )
        .optional()?;
    match parent_project {
        Some(p) if p == project_id => Ok(()),
        // A parent in another project does not resolve within this one.
        _ => Err(NoteTreeError::NoteNotFound(parent_id.to_string())),
    }
}

/// Fails with `InvalidMove` if `new_parent_id` is `note_id` or one of its descendants.
///
/// Walks the ancestor chain of `new_parent_id` upward. A chain can be no
/// longer than the project's note count; revisiting a note or outrunning that
/// count means the parent graph already holds a cycle, reported as
/// [`NoteTreeError::DepthLimitExceeded`].
fn ensure_not_descendant(
    conn: &Connection,
    project_id: &str,
    note_id: &str,
    new_parent_id: &str,
) -> Result<()> {
    if new_parent_id == note_id {
        return Err(NoteTreeError::InvalidMove(
            "A note cannot be its own parent".to_string(),
        ));
    }

    let limit: usize = conn.query_row(
        "SELECT COUNT(*) FROM notes WHERE project_id = ?1",
        [project_id],
        |row| row.get::<_, i64>(0),
    )? as usize;
    let mut visited = HashSet::from([new_parent_id.to_string()]);
    let mut current = new_parent_id.to_string();
    loop {
        let parent: Option<String> = conn
            .query_row(
                "SELECT parent_id FROM notes WHERE id = ?1",
                [&current],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| NoteTreeError::NoteNotFound(current.clone()))?;
        match parent {
            Some(pid) if pid == note_id => {
                return Err(NoteTreeError::InvalidMove(
                    "Move would create a cycle".to_string(),
                ));
            }
            Some(pid) => {
                if visited.len() >= limit || !visited.insert(pid.clone()) {
                    error!(
                        "event=note_move module=moves status=parent_cycle project={project_id} parent={new_parent_id}"
                    );
                    return Err(NoteTreeError::DepthLimitExceeded {
                        root: new_parent_id.to_string(),
                        limit,
                    });
                }
                current = pid;
            }
            None => return Ok(()),
        }
    }
}

/// Renumbers a non-dense group before a move so stored sequences equal ranks.
///
/// A gap left by deletion is always closed. Duplicate sequences are repaired
/// only when `repair_on_move` is set and otherwise fail the move.
fn close_group(
    conn: &Connection,
    config: &EngineConfig,
    project_id: &str,
    parent_id: Option<&str>,
) -> Result<bool> {
    if order::is_dense(conn, project_id, parent_id)? {
        return Ok(false);
    }
    let dups = order::duplicate_sequences(conn, project_id, parent_id)?;
    if !dups.is_empty() && !config.repair_on_move {
        return Err(invariant_failure(
            project_id,
            parent_id,
            format!("duplicate sequences {dups:?} before move"),
        ));
    }
    let renumbered = normalize::normalize_group(conn, project_id, parent_id)?;
    if dups.is_empty() {
        debug!(
            "event=note_move module=moves status=gap_closed project={project_id} parent={} renumbered={renumbered}",
            parent_id.unwrap_or("<root>")
        );
    } else {
        warn!(
            "event=note_move module=moves status=repaired project={project_id} parent={} renumbered={renumbered}",
            parent_id.unwrap_or("<root>")
        );
    }
    Ok(true)
}

/// Renumbers a group left non-dense by a move and verifies it holds no duplicates.
///
/// Returns whether the group was renumbered.
fn repair_group(
    conn: &Connection,
    config: &EngineConfig,
    project_id: &str,
    parent_id: Option<&str>,
) -> Result<bool> {
    let mut repaired = false;
    if config.repair_on_move && !order::is_dense(conn, project_id, parent_id)? {
        let renumbered = normalize::normalize_group(conn, project_id, parent_id)?;
        warn!(
            "event=note_move module=moves status=repaired project={project_id} parent={} renumbered={renumbered}",
            parent_id.unwrap_or("<root>")
        );
        repaired = true;
    }

    let dups = order::duplicate_sequences(conn, project_id, parent_id)?;
    if !dups.is_empty() {
        return Err(invariant_failure(
            project_id,
            parent_id,
            format!("duplicate sequences {dups:?} after move"),
        ));
    }
    Ok(repaired)
}

fn invariant_failure(project_id: &str, parent_id: Option<&str>, detail: String) -> NoteTreeError {
    error!(
        "event=note_move module=moves status=invariant_failure project={project_id} parent={} detail={detail}",
        parent_id.unwrap_or("<root>")
    );
    NoteTreeError::ConstraintViolation {
        project_id: project_id.to_string(),
        parent_id: parent_id.map(str::to_string),
        detail,
    }
}

/// Maps a unique-index failure during a rank write to `ConstraintViolation`.
fn as_constraint_violation(
    err: NoteTreeError,
    project_id: &str,
    parent_id: Option<&str>,
) -> NoteTreeError {
    match err {
        NoteTreeError::Database(e) => constraint_error(e, project_id, parent_id),
        other => other,
    }
}

fn constraint_error(
    err: rusqlite::Error,
    project_id: &str,
    parent_id: Option<&str>,
) -> NoteTreeError {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            let detail = msg.unwrap_or_else(|| "unique sequence index rejected a write".to_string());
            invariant_failure(project_id, parent_id, detail)
        }
        other => NoteTreeError::Database(other),
    }
}

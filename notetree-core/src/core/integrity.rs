//! Read-only checks of a project's ordering invariants.

use crate::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// One violation found by [`check_project`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityIssue {
    /// More than one entry of a group holds the same sequence.
    DuplicateSequence {
        parent_id: Option<String>,
        sequence: i64,
        count: i64,
    },
    /// A group's sequences are not exactly `{1..size}`.
    NotDense {
        parent_id: Option<String>,
        size: i64,
        min_sequence: i64,
        max_sequence: i64,
    },
    /// A note's parent lives in a different project.
    CrossProjectParent { note_id: String, parent_id: String },
    /// A note has no order entry, or its entry disagrees with the note row.
    OrderMismatch { note_id: String },
}

/// Lists every invariant violation in `project_id`; empty means healthy.
pub(crate) fn check_project(conn: &Connection, project_id: &str) -> Result<Vec<IntegrityIssue>> {
    let mut issues = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT parent_id, sequence, COUNT(*) FROM note_order
         WHERE project_id = ?1
         GROUP BY IFNULL(parent_id, ''), sequence
         HAVING COUNT(*) > 1
         ORDER BY IFNULL(parent_id, ''), sequence",
    )?;
    let dups = stmt
        .query_map([project_id], |row| {
            Ok(IntegrityIssue::DuplicateSequence {
                parent_id: row.get(0)?,
                sequence: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    issues.extend(dups);

    let mut stmt = conn.prepare(
        "SELECT parent_id, COUNT(*), COUNT(DISTINCT sequence), MIN(sequence), MAX(sequence)
         FROM note_order
         WHERE project_id = ?1
         GROUP BY IFNULL(parent_id, '')
         ORDER BY IFNULL(parent_id, '')",
    )?;
    let groups = stmt
        .query_map([project_id], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (parent_id, size, distinct, min_sequence, max_sequence) in groups {
        if !(distinct == size && min_sequence == 1 && max_sequence == size) {
            issues.push(IntegrityIssue::NotDense {
                parent_id,
                size,
                min_sequence,
                max_sequence,
            });
        }
    }

    let mut stmt = conn.prepare(
        "SELECT n.id, n.parent_id FROM notes n
         JOIN notes p ON p.id = n.parent_id
         WHERE n.project_id = ?1 AND p.project_id <> n.project_id
         ORDER BY n.id",
    )?;
    let cross = stmt
        .query_map([project_id], |row| {
            Ok(IntegrityIssue::CrossProjectParent {
                note_id: row.get(0)?,
                parent_id: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    issues.extend(cross);

    let mut stmt = conn.prepare(
        "SELECT n.id FROM notes n
         LEFT JOIN note_order o ON o.note_id = n.id
         WHERE n.project_id = ?1
           AND (o.note_id IS NULL
                OR o.project_id <> n.project_id
                OR o.parent_id IS NOT n.parent_id)
         ORDER BY n.id",
    )?;
    let mismatched = stmt
        .query_map([project_id], |row| {
            Ok(IntegrityIssue::OrderMismatch { note_id: row.get(0)? })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    issues.extend(mismatched);

    Ok(issues)
}

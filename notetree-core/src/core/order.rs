//! Sibling-group ranks: lookup, next-sequence allocation and range shifts.
//!
//! Every function takes a plain [`Connection`] so it can run either on the
//! store connection or inside a caller's [`Transaction`] (which derefs to one).
//! Parent keys are compared with `IS`, so `None` selects only the root group.

use crate::{NoteTreeError, OrderEntry, Result};
use rusqlite::{Connection, OptionalExtension, Transaction};

/// Returns one past the highest sequence in the group, or 1 for an empty group.
///
/// Only meaningful when the result is consumed in the same write transaction
/// that computed it; see [`create_order_entry`].
pub fn next_sequence(conn: &Connection, project_id: &str, parent_id: Option<&str>) -> Result<i64> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(sequence), 0) + 1 FROM note_order
         WHERE project_id = ?1 AND parent_id IS ?2",
        rusqlite::params![project_id, parent_id],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Number of entries in the group.
pub fn group_size(conn: &Connection, project_id: &str, parent_id: Option<&str>) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM note_order WHERE project_id = ?1 AND parent_id IS ?2",
        rusqlite::params![project_id, parent_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Appends an order entry for `note_id` at the end of its group.
///
/// Must be called inside the transaction that inserts the note itself. When
/// that transaction is IMMEDIATE (see
/// [`Storage::immediate_transaction`](crate::Storage::immediate_transaction)),
/// concurrent creators into the same group are serialized and can never claim
/// the same sequence.
///
/// Returns the assigned sequence.
pub fn create_order_entry(
    tx: &Transaction,
    project_id: &str,
    parent_id: Option<&str>,
    note_id: &str,
) -> Result<i64> {
    let sequence = next_sequence(tx, project_id, parent_id)?;
    tx.execute(
        "INSERT INTO note_order (note_id, project_id, parent_id, sequence) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![note_id, project_id, parent_id, sequence],
    )?;
    Ok(sequence)
}

/// Fetches the order entry of `note_id`.
///
/// # Errors
///
/// Returns [`NoteTreeError::NoteNotFound`] if the note has no entry.
pub fn get_entry(conn: &Connection, note_id: &str) -> Result<OrderEntry> {
    conn.query_row(
        "SELECT note_id, project_id, parent_id, sequence FROM note_order WHERE note_id = ?1",
        [note_id],
        map_entry_row,
    )
    .optional()?
    .ok_or_else(|| NoteTreeError::NoteNotFound(note_id.to_string()))
}

/// Lists a group by rank, ties broken by note id.
pub fn list_group(
    conn: &Connection,
    project_id: &str,
    parent_id: Option<&str>,
) -> Result<Vec<OrderEntry>> {
    let mut stmt = conn.prepare(
        "SELECT note_id, project_id, parent_id, sequence FROM note_order
         WHERE project_id = ?1 AND parent_id IS ?2
         ORDER BY sequence ASC, note_id ASC",
    )?;
    let entries = stmt
        .query_map(rusqlite::params![project_id, parent_id], map_entry_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Distinct parent keys that currently have at least one entry in the project.
///
/// The root group, if present, comes first as `None`.
pub fn list_group_parents(conn: &Connection, project_id: &str) -> Result<Vec<Option<String>>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT parent_id FROM note_order WHERE project_id = ?1
         ORDER BY parent_id IS NOT NULL, parent_id",
    )?;
    let parents = stmt
        .query_map([project_id], |row| row.get::<_, Option<String>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(parents)
}

/// Highest sequence held by any entry in the project, or 0 if it has none.
pub fn max_sequence_in_project(conn: &Connection, project_id: &str) -> Result<i64> {
    let max = conn.query_row(
        "SELECT COALESCE(MAX(sequence), 0) FROM note_order WHERE project_id = ?1",
        [project_id],
        |row| row.get(0),
    )?;
    Ok(max)
}

/// Sequence values held by more than one entry of the group, ascending.
pub fn duplicate_sequences(
    conn: &Connection,
    project_id: &str,
    parent_id: Option<&str>,
) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT sequence FROM note_order
         WHERE project_id = ?1 AND parent_id IS ?2
         GROUP BY sequence HAVING COUNT(*) > 1
         ORDER BY sequence",
    )?;
    let dups = stmt
        .query_map(rusqlite::params![project_id, parent_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(dups)
}

/// True when the group's sequences are exactly `{1..N}`. An empty group is dense.
pub fn is_dense(conn: &Connection, project_id: &str, parent_id: Option<&str>) -> Result<bool> {
    let (count, distinct, min, max): (i64, i64, Option<i64>, Option<i64>) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT sequence), MIN(sequence), MAX(sequence)
         FROM note_order WHERE project_id = ?1 AND parent_id IS ?2",
        rusqlite::params![project_id, parent_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;
    Ok(count == 0 || (distinct == count && min == Some(1) && max == Some(count)))
}

/// Adds `delta` to every sequence of the group inside `[lower, upper]`
/// (`upper == None` means unbounded), skipping `exclude_note`.
///
/// SQLite checks unique indexes row by row during an UPDATE, so a plain
/// `sequence = sequence + 1` can trip over a neighbour that has not moved yet.
/// The shifted rows are first written as negatives and then flipped back,
/// which never produces two equal keys at any point.
///
/// Returns the number of entries shifted.
pub(crate) fn shift_range(
    conn: &Connection,
    project_id: &str,
    parent_id: Option<&str>,
    lower: i64,
    upper: Option<i64>,
    delta: i64,
    exclude_note: &str,
) -> Result<usize> {
    let shifted = conn.execute(
        "UPDATE note_order SET sequence = -(sequence + ?5)
         WHERE project_id = ?1 AND parent_id IS ?2
           AND sequence >= ?3 AND (?4 IS NULL OR sequence <= ?4)
           AND note_id <> ?6",
        rusqlite::params![project_id, parent_id, lower, upper, delta, exclude_note],
    )?;
    if shifted > 0 {
        conn.execute(
            "UPDATE note_order SET sequence = -sequence
             WHERE project_id = ?1 AND parent_id IS ?2 AND sequence < 0",
            rusqlite::params![project_id, parent_id],
        )?;
    }
    Ok(shifted)
}

/// Overwrites the group and sequence of one entry.
pub(crate) fn set_position(
    conn: &Connection,
    note_id: &str,
    parent_id: Option<&str>,
    sequence: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE note_order SET parent_id = ?2, sequence = ?3 WHERE note_id = ?1",
        rusqlite::params![note_id, parent_id, sequence],
    )?;
    Ok(())
}

/// Row-mapping closure for `note_order` rows selected as
/// `note_id, project_id, parent_id, sequence`.
pub(crate) fn map_entry_row(row: &rusqlite::Row) -> rusqlite::Result<OrderEntry> {
    Ok(OrderEntry {
        note_id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        sequence: row.get(3)?,
    })
}

//! High-level operations over a Notetree SQLite store.

use crate::core::moves::{self, MoveOutcome};
use crate::core::{delete, integrity, normalize, order};
use crate::{
    DeleteResult, EngineConfig, IntegrityIssue, NormalizeResult, NormalizeScope, Note,
    NoteTreeError, OrderEntry, Project, Result, Storage,
};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// An open note store.
///
/// `NoteTree` is the entry point for every structural mutation. Each mutating
/// method runs in its own IMMEDIATE transaction and either commits completely
/// or leaves the store unchanged. Project and parent are always explicit
/// arguments; the tree keeps no selection state between calls.
///
/// Several `NoteTree` values may be open on the same file (one per session or
/// thread); SQLite's write lock serializes their mutations.
pub struct NoteTree {
    storage: Storage,
    config: EngineConfig,
}

impl NoteTree {
    /// Creates a new store at `path` and initialises the schema.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::InvalidConfig`] for unusable settings or
    /// [`NoteTreeError::Database`] for any SQLite failure.
    pub fn create<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = Storage::create(path, &config)?;
        Ok(Self { storage, config })
    }

    /// Opens an existing store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::InvalidStore`] if the file is not a Notetree
    /// database, or [`NoteTreeError::Database`] for any SQLite failure.
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = Storage::open(path, &config)?;
        Ok(Self { storage, config })
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = Storage::open_in_memory(&config)?;
        Ok(Self { storage, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        self.storage.connection()
    }

    /// Creates an empty project.
    pub fn create_project(&mut self, name: &str) -> Result<Project> {
        let now = chrono::Utc::now().timestamp();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            note_count: 0,
            created_at: now,
            modified_at: now,
        };
        self.connection().execute(
            "INSERT INTO projects (id, name, note_count, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                project.id,
                project.name,
                project.note_count,
                project.created_at,
                project.modified_at,
            ],
        )?;
        Ok(project)
    }

    /// Fetches a project by ID.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::ProjectNotFound`] if it does not exist.
    pub fn get_project(&self, project_id: &str) -> Result<Project> {
        self.connection()
            .query_row(
                "SELECT id, name, note_count, created_at, modified_at FROM projects WHERE id = ?1",
                [project_id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        note_count: row.get(2)?,
                        created_at: row.get(3)?,
                        modified_at: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| NoteTreeError::ProjectNotFound(project_id.to_string()))
    }

    /// Creates a note at the end of the `(project_id, parent_id)` group.
    ///
    /// The note row, its order entry and the refreshed project note count are
    /// written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::ProjectNotFound`] if the project does not
    /// exist, or [`NoteTreeError::NoteNotFound`] if `parent_id` does not
    /// resolve to a note of the same project.
    pub fn create_note(
        &mut self,
        project_id: &str,
        parent_id: Option<&str>,
        content: &str,
    ) -> Result<Note> {
        let now = chrono::Utc::now().timestamp();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };

        let tx = self.storage.immediate_transaction()?;

        let exists = tx
            .query_row("SELECT 1 FROM projects WHERE id = ?1", [project_id], |_| Ok(()))
            .optional()?;
        if exists.is_none() {
            return Err(NoteTreeError::ProjectNotFound(project_id.to_string()));
        }
        if let Some(pid) = parent_id {
            let parent_project: Option<String> = tx
                .query_row("SELECT project_id FROM notes WHERE id = ?1", [pid], |row| {
                    row.get(0)
                })
                .optional()?;
            if parent_project.as_deref() != Some(project_id) {
                return Err(NoteTreeError::NoteNotFound(pid.to_string()));
            }
        }

        tx.execute(
            "INSERT INTO notes (id, project_id, parent_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                note.id,
                note.project_id,
                note.parent_id,
                note.content,
                note.created_at,
                note.updated_at,
            ],
        )?;
        let sequence = order::create_order_entry(&tx, project_id, parent_id, &note.id)?;

        tx.execute(
            "UPDATE projects
             SET note_count = (SELECT COUNT(*) FROM notes WHERE project_id = ?1),
                 modified_at = ?2
             WHERE id = ?1",
            rusqlite::params![project_id, now],
        )?;

        tx.commit()?;
        debug!(
            "event=note_create module=tree status=ok project={project_id} note={} sequence={sequence}",
            note.id
        );
        Ok(note)
    }

    /// Fetches a single note by ID.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NoteNotFound`] if it does not exist.
    pub fn get_note(&self, note_id: &str) -> Result<Note> {
        self.connection()
            .query_row(
                "SELECT id, project_id, parent_id, content, created_at, updated_at
                 FROM notes WHERE id = ?1",
                [note_id],
                map_note_row,
            )
            .optional()?
            .ok_or_else(|| NoteTreeError::NoteNotFound(note_id.to_string()))
    }

    /// Returns the notes of one sibling group in display order.
    pub fn get_children(&self, project_id: &str, parent_id: Option<&str>) -> Result<Vec<Note>> {
        let mut stmt = self.connection().prepare(
            "SELECT n.id, n.project_id, n.parent_id, n.content, n.created_at, n.updated_at
             FROM notes n
             JOIN note_order o ON o.note_id = n.id
             WHERE o.project_id = ?1 AND o.parent_id IS ?2
             ORDER BY o.sequence, n.id",
        )?;
        let notes = stmt
            .query_map(rusqlite::params![project_id, parent_id], map_note_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Replaces the opaque content of a note.
    pub fn update_note_content(&mut self, note_id: &str, content: &str) -> Result<()> {
        let changed = self.connection().execute(
            "UPDATE notes SET content = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![note_id, content, chrono::Utc::now().timestamp()],
        )?;
        if changed == 0 {
            return Err(NoteTreeError::NoteNotFound(note_id.to_string()));
        }
        Ok(())
    }

    /// Returns the order entry of one note.
    pub fn order_entry(&self, note_id: &str) -> Result<OrderEntry> {
        order::get_entry(self.connection(), note_id)
    }

    /// Returns one sibling group's order entries by rank.
    pub fn list_group(&self, project_id: &str, parent_id: Option<&str>) -> Result<Vec<OrderEntry>> {
        order::list_group(self.connection(), project_id, parent_id)
    }

    /// Moves a note to `requested_position` (1-based) among the children of
    /// `new_parent_id` (`None` for the project root).
    ///
    /// Positions are ranks: a gap left by [`NoteTree::delete_subtree`] does
    /// not count as a slot. Out-of-range positions are clamped to the first or
    /// last valid slot. Moving a note onto its current rank writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NoteNotFound`] if the note or the new parent
    /// does not resolve within the note's project,
    /// [`NoteTreeError::InvalidMove`] if the new parent is the note itself or
    /// one of its descendants, [`NoteTreeError::DepthLimitExceeded`] if the
    /// new parent's ancestor chain loops, and
    /// [`NoteTreeError::ConstraintViolation`] if an affected group holds
    /// duplicate sequences that were not repaired. In every error case the
    /// store is unchanged.
    pub fn move_note(
        &mut self,
        note_id: &str,
        new_parent_id: Option<&str>,
        requested_position: i64,
    ) -> Result<()> {
        let started_at = Instant::now();
        let tx = self.storage.immediate_transaction()?;
        let outcome = moves::move_in_tx(
            &tx,
            &self.config,
            note_id,
            new_parent_id,
            requested_position,
        )?;
        tx.commit()?;

        if let MoveOutcome::Moved {
            from,
            to_parent,
            to_sequence,
            repaired_groups,
        } = outcome
        {
            info!(
                "event=note_move module=tree status=ok note={note_id} from={}:{} to={}:{to_sequence} repaired_groups={repaired_groups} duration_ms={}",
                from.parent_id.as_deref().unwrap_or("<root>"),
                from.sequence,
                to_parent.as_deref().unwrap_or("<root>"),
                started_at.elapsed().as_millis()
            );
        }
        Ok(())
    }

    /// Deletes `root_id` and every descendant as one unit.
    ///
    /// The owning project's `note_count` is recomputed in the same
    /// transaction. Surviving siblings of `root_id` keep their sequences; run
    /// [`normalize`](Self::normalize) to close the gap.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::NoteNotFound`] if `root_id` does not exist and
    /// [`NoteTreeError::DepthLimitExceeded`] if the subtree is deeper than
    /// `max_subtree_depth`. Nothing is deleted on error.
    pub fn delete_subtree(&mut self, root_id: &str) -> Result<DeleteResult> {
        let tx = self.storage.immediate_transaction()?;
        let (project_id, result) =
            delete::delete_subtree_in_tx(&tx, root_id, self.config.max_subtree_depth)?;
        tx.commit()?;
        info!(
            "event=subtree_delete module=tree status=ok project={project_id} root={root_id} deleted={}",
            result.deleted_count
        );
        Ok(result)
    }

    /// Renumbers the selected groups of `project_id` to dense `1..N` ranks.
    ///
    /// # Errors
    ///
    /// Returns [`NoteTreeError::ProjectNotFound`] if the project does not exist.
    pub fn normalize(&mut self, project_id: &str, scope: NormalizeScope) -> Result<NormalizeResult> {
        let tx = self.storage.immediate_transaction()?;
        let result = normalize::normalize_in_tx(&tx, project_id, &scope)?;
        tx.commit()?;
        info!(
            "event=normalize module=tree status=ok project={project_id} groups={} renumbered={}",
            result.groups_scanned, result.entries_renumbered
        );
        Ok(result)
    }

    /// Lists ordering invariant violations in a project. Read-only.
    pub fn check_integrity(&self, project_id: &str) -> Result<Vec<IntegrityIssue>> {
        self.get_project(project_id)?;
        integrity::check_project(self.connection(), project_id)
    }
}

fn map_note_row(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

use notetree_core::{EngineConfig, NoteTree, NoteTreeError};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::NamedTempFile;

fn ranks(tree: &NoteTree, project_id: &str, parent: Option<&str>) -> Vec<(String, i64)> {
    tree.list_group(project_id, parent)
        .unwrap()
        .into_iter()
        .map(|e| (e.note_id, e.sequence))
        .collect()
}

#[test]
fn concurrent_creates_never_share_a_sequence() {
    let temp = NamedTempFile::new().unwrap();
    let project_id = {
        let mut tree = NoteTree::create(temp.path(), EngineConfig::default()).unwrap();
        tree.create_project("Shared").unwrap().id
    };

    const SESSIONS: usize = 4;
    const PER_SESSION: usize = 5;
    let barrier = Arc::new(Barrier::new(SESSIONS));
    let handles: Vec<_> = (0..SESSIONS)
        .map(|_| {
            let path = temp.path().to_path_buf();
            let project_id = project_id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut tree = NoteTree::open(&path, EngineConfig::default()).unwrap();
                barrier.wait();
                for _ in 0..PER_SESSION {
                    tree.create_note(&project_id, None, "").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let tree = NoteTree::open(temp.path(), EngineConfig::default()).unwrap();
    let seqs: Vec<i64> = ranks(&tree, &project_id, None)
        .into_iter()
        .map(|(_, s)| s)
        .collect();
    let expected: Vec<i64> = (1..=(SESSIONS * PER_SESSION) as i64).collect();
    assert_eq!(seqs, expected);
    assert_eq!(
        tree.get_project(&project_id).unwrap().note_count,
        (SESSIONS * PER_SESSION) as i64
    );
}

#[test]
fn two_sessions_creating_into_empty_group() {
    let temp = NamedTempFile::new().unwrap();
    let project_id = {
        let mut tree = NoteTree::create(temp.path(), EngineConfig::default()).unwrap();
        tree.create_project("Pair").unwrap().id
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = temp.path().to_path_buf();
            let project_id = project_id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut tree = NoteTree::open(&path, EngineConfig::default()).unwrap();
                barrier.wait();
                let note = tree.create_note(&project_id, None, "").unwrap();
                tree.order_entry(&note.id).unwrap().sequence
            })
        })
        .collect();
    let got: HashSet<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(got, HashSet::from([1, 2]));
}

#[test]
fn concurrent_moves_keep_group_dense() {
    let temp = NamedTempFile::new().unwrap();
    let (project_id, ids) = {
        let mut tree = NoteTree::create(temp.path(), EngineConfig::default()).unwrap();
        let project = tree.create_project("Moves").unwrap();
        let ids: Vec<String> = (0..6)
            .map(|_| tree.create_note(&project.id, None, "").unwrap().id)
            .collect();
        (project.id, ids)
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|session| {
            let path = temp.path().to_path_buf();
            let ids = ids.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut tree = NoteTree::open(&path, EngineConfig::default()).unwrap();
                barrier.wait();
                for round in 0..10 {
                    let note = &ids[(session * 3 + round) % ids.len()];
                    let position = ((round * 7 + session) % ids.len()) as i64 + 1;
                    tree.move_note(note, None, position).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let tree = NoteTree::open(temp.path(), EngineConfig::default()).unwrap();
    let seqs: Vec<i64> = ranks(&tree, &project_id, None)
        .into_iter()
        .map(|(_, s)| s)
        .collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    assert!(tree.check_integrity(&project_id).unwrap().is_empty());
}

#[test]
fn delete_subtree_is_all_or_nothing() {
    let mut tree = NoteTree::open_in_memory(EngineConfig::default()).unwrap();
    let p = tree.create_project("Atomic").unwrap().id;
    let x = tree.create_note(&p, None, "x").unwrap().id;
    let pn = tree.create_note(&p, Some(&x), "p").unwrap().id;
    let q = tree.create_note(&p, Some(&x), "q").unwrap().id;
    let other = tree.create_note(&p, None, "other").unwrap().id;

    // Fail the transaction part way through, after some rows are already gone.
    tree.connection()
        .execute_batch(&format!(
            "CREATE TEMP TRIGGER fail_on_x BEFORE DELETE ON notes
             WHEN OLD.id = '{x}'
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;"
        ))
        .unwrap();

    let err = tree.delete_subtree(&x).unwrap_err();
    assert!(matches!(err, NoteTreeError::Database(_)));
    for id in [&x, &pn, &q, &other] {
        assert!(tree.get_note(id).is_ok(), "note {id} should survive");
        assert!(tree.order_entry(id).is_ok(), "entry {id} should survive");
    }
    assert_eq!(tree.get_project(&p).unwrap().note_count, 4);

    tree.connection()
        .execute_batch("DROP TRIGGER fail_on_x")
        .unwrap();
    let result = tree.delete_subtree(&x).unwrap();

    assert_eq!(result.deleted_count, 3);
    let removed: HashSet<&String> = result.affected_ids.iter().collect();
    assert_eq!(removed, HashSet::from([&x, &pn, &q]));
    for id in [&x, &pn, &q] {
        assert!(matches!(tree.get_note(id), Err(NoteTreeError::NoteNotFound(_))));
    }
    assert_eq!(tree.get_project(&p).unwrap().note_count, 1);
}

#[test]
fn failed_move_leaves_no_parked_sentinel() {
    let mut tree = NoteTree::open_in_memory(EngineConfig::default()).unwrap();
    let p = tree.create_project("Rollback").unwrap().id;
    let a = tree.create_note(&p, None, "").unwrap().id;
    let b = tree.create_note(&p, None, "").unwrap().id;
    let before = ranks(&tree, &p, None);

    // Abort at the place phase, after park and shift have run.
    tree.connection()
        .execute_batch(&format!(
            "CREATE TEMP TRIGGER fail_on_place BEFORE UPDATE OF parent_id ON notes
             WHEN OLD.id = '{b}'
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;"
        ))
        .unwrap();

    assert!(tree.move_note(&b, Some(&a), 1).is_err());
    assert_eq!(ranks(&tree, &p, None), before);
    assert!(tree.check_integrity(&p).unwrap().is_empty());
}

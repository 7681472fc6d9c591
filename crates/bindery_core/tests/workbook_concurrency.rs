use bindery_core::db::open_db;
use bindery_core::{
    PutCondition, ShareRetryPolicy, SqliteWorkbookStore, Workbook, WorkbookKey, WorkbookService,
    WorkbookStore,
};
use std::thread;

const GRANTEES: usize = 6;

#[test]
fn concurrent_shares_with_distinct_grantees_lose_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindery.db");

    let mut conn = open_db(&path).unwrap();
    {
        let mut store = SqliteWorkbookStore::try_new(&mut conn).unwrap();
        let workbook = Workbook::new("u1", "wb1", "contended", "d", "");
        store
            .put_workbook(&workbook, PutCondition::KeyMustNotExist)
            .unwrap();
    }

    let mut handles = Vec::new();
    for index in 0..GRANTEES {
        let path = path.clone();
        handles.push(thread::spawn(move || {
            let mut conn = open_db(&path).unwrap();
            let store = SqliteWorkbookStore::try_new(&mut conn).unwrap();
            // Every lost race implies another caller committed, so with
            // GRANTEES writers a caller needs at most GRANTEES attempts.
            let mut service = WorkbookService::with_retry_policy(
                store,
                ShareRetryPolicy {
                    max_attempts: GRANTEES as u32,
                },
            );
            service.share("u1", "wb1", &format!("grantee-{index}"))
        }));
    }

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let store = SqliteWorkbookStore::try_new(&mut conn).unwrap();
    let stored = store
        .get_workbook(&WorkbookKey::new("u1", "wb1"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.shared_with.len(), GRANTEES, "no grant may be lost");
    for index in 0..GRANTEES {
        assert!(stored.is_shared_with(&format!("grantee-{index}")));
    }

    let grants = store.grants_for_workbook("wb1").unwrap();
    assert_eq!(grants.len(), GRANTEES);
}

#[test]
fn concurrent_double_create_has_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindery.db");

    // Apply migrations once before the writers race.
    drop(open_db(&path).unwrap());

    let mut handles = Vec::new();
    for index in 0..2 {
        let path = path.clone();
        handles.push(thread::spawn(move || {
            let mut conn = open_db(&path).unwrap();
            let mut store = SqliteWorkbookStore::try_new(&mut conn).unwrap();
            let workbook = Workbook::new("u1", "wb1", format!("writer-{index}"), "d", "");
            store.put_workbook(&workbook, PutCondition::KeyMustNotExist)
        }));
    }

    let outcomes: Vec<bool> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().is_ok())
        .collect();
    let winners = outcomes.iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1, "exactly one creation may win the race");

    let mut conn = open_db(&path).unwrap();
    let store = SqliteWorkbookStore::try_new(&mut conn).unwrap();
    assert!(store
        .get_workbook(&WorkbookKey::new("u1", "wb1"))
        .unwrap()
        .is_some());
}

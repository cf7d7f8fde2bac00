use std::fs;
use std::path::PathBuf;

use atomic_sink::{
    AtomicSinkError, AtomicWriteSession, FinalizeOutcome, FinalizePolicy, Record, SessionGroup,
};
use tempfile::tempdir;

fn record(no: &str, name: &str) -> Record {
    [("no", no), ("name", name)].into_iter().collect()
}

#[test]
fn open_same_destination_twice_is_rejected() {
    let td = tempdir().unwrap();
    let dest = td.path().join("out.txt");

    let mut group = SessionGroup::new();
    group.open(&dest).unwrap();
    assert!(group.is_open(&dest));
    assert!(matches!(
        group.open(&dest),
        Err(AtomicSinkError::AlreadyOpen(_))
    ));

    // Cleanup so nothing is dropped un-finalized.
    group.set_policy_all(FinalizePolicy::Discard).unwrap();
    group.finalize_all().unwrap();
}

#[test]
fn get_unopened_destination_is_rejected() {
    let group = SessionGroup::new();
    assert!(!group.is_open("never/opened.txt"));
    assert!(matches!(
        group.get("never/opened.txt"),
        Err(AtomicSinkError::NotOpen(_))
    ));
}

#[test]
fn add_registers_under_its_own_destination() {
    let td = tempdir().unwrap();
    let dest = td.path().join("out.txt");

    let session = AtomicWriteSession::create(&dest).unwrap();
    let mut group = SessionGroup::new();
    group.add(session).unwrap();
    assert!(group.is_open(&dest));

    let duplicate = AtomicWriteSession::create(&dest).unwrap();
    let temp = duplicate.temp_path().to_path_buf();
    assert!(matches!(
        group.add(duplicate),
        Err(AtomicSinkError::AlreadyOpen(_))
    ));
    // The rejected session is returned to the caller's control; discard it.
    fs::remove_file(temp).ok();

    group.set_policy_all(FinalizePolicy::Discard).unwrap();
    group.finalize_all().unwrap();
}

#[test]
fn broadcast_policy_applies_to_every_member() {
    let td = tempdir().unwrap();
    let a = td.path().join("a.txt");
    let b = td.path().join("b.txt");

    let mut group = SessionGroup::new();
    group.open(&a).unwrap().write(b"alpha").unwrap();
    group.open(&b).unwrap().write(b"beta").unwrap();
    group.set_policy_all(FinalizePolicy::Persist).unwrap();

    let outcomes = group.finalize_all().unwrap();
    assert_eq!(
        outcomes,
        vec![
            (a.clone(), FinalizeOutcome::Persisted),
            (b.clone(), FinalizeOutcome::Persisted),
        ],
        "members finalize in insertion order"
    );
    assert_eq!(fs::read(&a).unwrap(), b"alpha");
    assert_eq!(fs::read(&b).unwrap(), b"beta");
}

#[test]
fn finalize_all_collects_failures_and_keeps_going() {
    let td = tempdir().unwrap();
    let broken = td.path().join("missing-dir").join("a.txt");
    let good = td.path().join("b.txt");

    let mut group = SessionGroup::new();
    // No directory mode on the first member: its rename has nowhere to land.
    group.open(&broken).unwrap().write(b"alpha").unwrap();
    group.open(&good).unwrap().write(b"beta").unwrap();
    group.set_policy_all(FinalizePolicy::Persist).unwrap();

    let err = group.finalize_all().expect_err("one member must fail");
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, broken);
    assert!(err.failures[0].1.is_io());
    assert_eq!(err.outcomes, vec![(good.clone(), FinalizeOutcome::Persisted)]);
    assert_eq!(fs::read(&good).unwrap(), b"beta", "later members still persist");
}

#[test]
fn split_records_routes_rows_with_one_header_each() {
    let td = tempdir().unwrap();

    let rows = vec![
        record("1", "alpha"),
        record("2", "beta"),
        record("1", "delta"),
        record("3", "gamma"),
        record("2", "epsilon"),
    ];

    let base = td.path().to_path_buf();
    let mut group = SessionGroup::new();
    group
        .split_records(rows, |row| {
            base.join(format!("result-{}", row.get("no").unwrap()))
        })
        .unwrap();

    assert_eq!(group.len(), 3, "one session per distinct key");
    let opened: Vec<PathBuf> = group.paths().map(PathBuf::from).collect();
    assert_eq!(
        opened,
        vec![
            base.join("result-1"),
            base.join("result-2"),
            base.join("result-3"),
        ],
        "sessions appear in first-arrival order"
    );

    group.set_policy_all(FinalizePolicy::Persist).unwrap();
    group.finalize_all().unwrap();

    assert_eq!(
        fs::read_to_string(base.join("result-1")).unwrap(),
        "no,name\n1,alpha\n1,delta\n"
    );
    assert_eq!(
        fs::read_to_string(base.join("result-2")).unwrap(),
        "no,name\n2,beta\n2,epsilon\n"
    );
    assert_eq!(
        fs::read_to_string(base.join("result-3")).unwrap(),
        "no,name\n3,gamma\n"
    );
}

#[test]
fn split_records_quotes_awkward_values() {
    let td = tempdir().unwrap();
    let base = td.path().to_path_buf();

    let rows = vec![[("no", "1"), ("name", "comma, inc.")]
        .into_iter()
        .collect::<Record>()];

    let mut group = SessionGroup::new();
    group
        .split_records(rows, |_| base.join("quoted.csv"))
        .unwrap();
    group.set_policy_all(FinalizePolicy::Persist).unwrap();
    group.finalize_all().unwrap();

    assert_eq!(
        fs::read_to_string(base.join("quoted.csv")).unwrap(),
        "no,name\n1,\"comma, inc.\"\n"
    );
}

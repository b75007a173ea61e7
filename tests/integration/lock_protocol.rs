use std::sync::{Arc, Barrier};
use std::thread;

use basalt::db::{Config, MemoryTransport};
use basalt::exec::Identity;
use basalt::lock::LockManager;
use basalt::registry::{FieldKind, Registry};
use basalt::types::{RecordId, SessionId};
use basalt::BasaltError;

fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .vertex("Task", "tasks", &[("Title", FieldKind::Str)])
            .build()
            .expect("registry builds"),
    )
}

fn manager(
    transport: &Arc<MemoryTransport>,
    identity: &str,
    session: &str,
) -> LockManager<MemoryTransport> {
    LockManager::new(
        Arc::clone(transport),
        registry(),
        Identity::new(identity),
        SessionId::from(session),
        &Config::default(),
    )
}

#[test]
fn racing_sessions_yield_exactly_one_winner() {
    let transport = Arc::new(MemoryTransport::new());
    let target = RecordId::from("tasks/1");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [("users/a", "s1"), ("users/b", "s2")]
        .into_iter()
        .map(|(identity, session)| {
            let transport = Arc::clone(&transport);
            let barrier = Arc::clone(&barrier);
            let target = target.clone();
            thread::spawn(move || {
                let locks = manager(&transport, identity, session);
                barrier.wait();
                locks.lock(&target).expect("acquire call succeeds")
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();
    let winners = results.iter().filter(|outcome| outcome.is_some()).count();
    assert_eq!(winners, 1, "exactly one session observes success");
    assert!(transport.lock_row("tasks/1").is_some());
}

#[test]
fn same_session_relock_extends_rather_than_duplicates() {
    let transport = Arc::new(MemoryTransport::new());
    let locks = manager(&transport, "users/a", "s1");
    let target = RecordId::from("tasks/1");

    let first = locks.lock(&target).unwrap().expect("first acquire");
    let second = locks.lock(&target).unwrap().expect("renewal");
    assert_eq!(first.holder, second.holder);
    assert_eq!(first.session, second.session);
    assert!(second.expires >= first.expires);
    // Two acquire statements, still one row.
    assert_eq!(transport.statement_count(), 2);
    assert!(transport.lock_row("tasks/1").is_some());
}

#[test]
fn unlock_releases_only_the_callers_lock() {
    let transport = Arc::new(MemoryTransport::new());
    let target = RecordId::from("tasks/1");
    let mine = manager(&transport, "users/a", "s1");
    let theirs = manager(&transport, "users/b", "s2");

    mine.lock(&target).unwrap().expect("acquired");
    assert!(theirs.lock(&target).unwrap().is_none(), "held elsewhere");
    assert!(matches!(
        theirs.unlock(&target),
        Err(BasaltError::NotFound("lock"))
    ));

    mine.unlock(&target).expect("own lock releases");
    assert!(theirs.lock(&target).unwrap().is_some(), "free after release");
}

#[test]
fn contention_outcome_is_a_value_not_an_error() {
    let transport = Arc::new(MemoryTransport::new());
    let target = RecordId::from("tasks/1");
    manager(&transport, "users/a", "s1")
        .lock(&target)
        .unwrap()
        .expect("acquired");
    // The foreign caller gets an ordinary None to retry on.
    let outcome = manager(&transport, "users/b", "s2").lock(&target);
    assert!(matches!(outcome, Ok(None)));
}

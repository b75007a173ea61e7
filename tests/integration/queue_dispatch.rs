use std::sync::Arc;

use basalt::bql::builder::BqlBuilder;
use basalt::bql::syntax::FilterSyntax;
use basalt::db::{Config, MemoryTransport};
use basalt::exec::{Executor, Identity};
use basalt::lock::LockManager;
use basalt::queue::{QueueDef, QueueMember, WorkQueue};
use basalt::registry::{FieldKind, Registry};
use basalt::types::{QueueId, RecordId, SessionId};
use serde_json::{json, Value};

fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .vertex("Task", "tasks", &[("State", FieldKind::Str)])
            .vertex("User", "users", &[("Username", FieldKind::Str)])
            .edge("assignedTo", "assignments", &[])
            .build()
            .expect("registry builds"),
    )
}

fn work_queue(transport: &Arc<MemoryTransport>) -> WorkQueue<MemoryTransport> {
    let registry = registry();
    let identity = Identity::new("users/worker");
    let executor = Executor::new(Arc::clone(transport), Arc::clone(&registry), identity.clone());
    let locks = LockManager::new(
        Arc::clone(transport),
        registry,
        identity,
        SessionId::from("dispatch-session"),
        &Config::default(),
    );
    WorkQueue::new(executor, locks)
}

fn intake_queue() -> QueueDef {
    QueueDef {
        id: QueueId::from("queues/intake"),
        members: vec![
            QueueMember {
                name: "open tasks".into(),
                rank: 9,
                query: BqlBuilder::traverse("Task")
                    .filter(FilterSyntax::cmp("State", "=", "open"))
                    .finish()
                    .unwrap(),
            },
            QueueMember {
                name: "assigned tasks".into(),
                rank: 1,
                query: BqlBuilder::traverse("Task")
                    .edge_out("assignedTo")
                    .vertex("User")
                    .finish()
                    .unwrap(),
            },
        ],
    }
}

fn task_row(id: &str, forced_rank: i64, rank: i64) -> Value {
    json!({
        "_id": id,
        "ModelType": "Task",
        "State": "open",
        "Rank": rank,
        "ForcedRank": forced_rank,
        "IsOnHold": false,
    })
}

#[test]
fn peek_compiles_both_members_into_one_ranked_statement() {
    let transport = Arc::new(MemoryTransport::new());
    let queue = work_queue(&transport);
    queue.peek(&intake_queue(), 0, 25, false).unwrap();

    let statements = transport.statements();
    assert_eq!(statements.len(), 1, "selection is a single statement");
    let text = &statements[0].text;
    // Both member candidate sets are present and annotated with their
    // declared ranks.
    assert!(text.contains("Rank: 9"));
    assert!(text.contains("Rank: 1"));
    assert!(text.contains("UNION_DISTINCT(m0, m1)"));
    // Override join defaults and lock exclusion.
    assert!(text.contains("ForcedRank: LENGTH(ov) == 0 ? 0 : FIRST(ov).ForcedRank"));
    assert!(text.contains("l.Expires > @now"));
    assert!(text.contains("FILTER LENGTH(lk) == 0"));
    // Ranking and paging.
    assert!(text.contains("SORT r.ForcedRank DESC, r.Rank DESC"));
    assert!(text.contains("LIMIT 0, 25"));
}

#[test]
fn forced_rank_dominates_declared_rank_in_the_sort() {
    let transport = Arc::new(MemoryTransport::new());
    let queue = work_queue(&transport);
    // Rows arrive in the statement's sort order.
    transport.push_response(vec![
        task_row("tasks/3", 1, 9),
        task_row("tasks/1", 1, 5),
        task_row("tasks/2", 0, 9),
    ]);
    let candidates = queue.peek(&intake_queue(), 0, 10, false).unwrap();
    let ranks: Vec<_> = candidates
        .iter()
        .map(|candidate| (candidate.forced_rank, candidate.rank))
        .collect();
    assert_eq!(ranks, vec![(1, 9), (1, 5), (0, 9)]);
    let statement = &transport.statements()[0];
    assert!(statement.text.contains("SORT r.ForcedRank DESC, r.Rank DESC"));
}

#[test]
fn dequeue_peeks_one_and_locks_it() {
    let transport = Arc::new(MemoryTransport::new());
    transport.push_response(vec![task_row("tasks/7", 0, 9)]);
    let queue = work_queue(&transport);

    let (candidate, lock) = queue
        .dequeue(&intake_queue())
        .unwrap()
        .expect("one candidate dequeued");
    assert_eq!(candidate.document.id().unwrap(), RecordId::from("tasks/7"));
    assert_eq!(lock.target, RecordId::from("tasks/7"));
    assert_eq!(lock.session, SessionId::from("dispatch-session"));

    let statements = transport.statements();
    assert_eq!(statements.len(), 2, "peek then lock");
    assert!(statements[0].text.contains("LIMIT 0, 1"));
    assert!(statements[1].text.contains("UPSERT"));
}

#[test]
fn dequeue_on_an_empty_queue_creates_no_lock_row() {
    let transport = Arc::new(MemoryTransport::new());
    transport.push_response(vec![]);
    let queue = work_queue(&transport);

    assert!(queue.dequeue(&intake_queue()).unwrap().is_none());
    assert_eq!(transport.statement_count(), 1, "only the peek ran");
    assert!(transport.lock_row("tasks/7").is_none());
}

#[test]
fn dequeued_items_stay_exclusive_across_sessions() {
    let transport = Arc::new(MemoryTransport::new());
    transport.push_response(vec![task_row("tasks/7", 0, 9)]);
    let first = work_queue(&transport);
    let (_, lock) = first.dequeue(&intake_queue()).unwrap().expect("dequeued");
    assert_eq!(lock.target, RecordId::from("tasks/7"));

    // A second consumer races on the same candidate before the queue
    // filter catches up; its lock attempt loses and dequeue yields empty.
    let transport2 = Arc::clone(&transport);
    transport2.push_response(vec![task_row("tasks/7", 0, 9)]);
    let registry = registry();
    let identity = Identity::new("users/other");
    let executor = Executor::new(Arc::clone(&transport2), Arc::clone(&registry), identity.clone());
    let locks = LockManager::new(
        Arc::clone(&transport2),
        registry,
        identity,
        SessionId::from("other-session"),
        &Config::default(),
    );
    let second = WorkQueue::new(executor, locks);
    assert!(second.dequeue(&intake_queue()).unwrap().is_none());
}

#[test]
fn hold_suppresses_and_release_restores() {
    let transport = Arc::new(MemoryTransport::new());
    let queue = work_queue(&transport);
    let queue_id = QueueId::from("queues/intake");
    let candidate = RecordId::from("tasks/7");

    let held = queue.hold(&queue_id, &candidate).unwrap();
    assert!(held.is_on_hold);
    assert_eq!(held.forced_rank, 0, "lazy override starts at the default");

    // Idempotent: holding again changes nothing.
    assert_eq!(queue.hold(&queue_id, &candidate).unwrap(), held);

    let released = queue.release(&queue_id, &candidate).unwrap();
    assert!(!released.is_on_hold);
    let row = transport
        .override_row("queues/intake", "tasks/7")
        .expect("single override row persists");
    assert_eq!(row.get("IsOnHold"), Some(&Value::Bool(false)));
}

#[test]
fn queued_count_is_one_summed_statement() {
    let transport = Arc::new(MemoryTransport::new());
    transport.push_response(vec![json!(12)]);
    let queue = work_queue(&transport);
    assert_eq!(queue.queued_count(&intake_queue()).unwrap(), 12);
    let statements = transport.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].text.contains(" + "), "per-member counts sum");
}

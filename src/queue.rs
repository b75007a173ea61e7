//! Priority work-queue built directly on the query compiler.
//!
//! A queue is defined by member queries: BQL query expressions whose
//! combined candidate sets form the queue's content, each carrying a
//! declared rank. Selection generates one statement: every member's
//! candidate set is annotated with its rank, left-joined to its queue
//! override row (absent means `ForcedRank 0`, not on hold), filtered
//! against live foreign locks, unioned, sorted `ForcedRank DESC, Rank
//! DESC`, and paged.
//!
//! `dequeue` composes `peek(count = 1)` with lock acquisition. The window
//! between the two is a real race; a candidate locked in that window makes
//! `dequeue` return empty, and the caller simply tries again.

use std::sync::Arc;

use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::debug;

use crate::bql::codegen::{Block, Clause, Generator};
use crate::bql::filter::ReturnShape;
use crate::bql::pipeline::{parse_query, Step};
use crate::bql::syntax::QuerySyntax;
use crate::db::transport::{AqlQuery, Transport};
use crate::error::{BasaltError, Result};
use crate::exec::Executor;
use crate::lock::LockManager;
use crate::model::{Document, LockRecord, QueueOverride};
use crate::types::{QueueId, RecordId};

/// One member query of a queue definition.
#[derive(Clone, Debug)]
pub struct QueueMember {
    /// Display name, for diagnostics.
    pub name: String,
    /// Declared rank; higher dequeues first.
    pub rank: i64,
    /// Candidate-defining BQL query expression.
    pub query: QuerySyntax,
}

/// A queue definition: identity plus member queries.
#[derive(Clone, Debug)]
pub struct QueueDef {
    /// Queue record id, the `_from` of override rows.
    pub id: QueueId,
    /// Member queries in declaration order.
    pub members: Vec<QueueMember>,
}

/// One selectable queue candidate.
#[derive(Clone, Debug)]
pub struct QueueCandidate {
    /// The candidate record, annotated by the selection statement.
    pub document: Document,
    /// Declared rank of the member query that produced it.
    pub rank: i64,
    /// Operator-forced rank from the override row.
    pub forced_rank: i64,
    /// Whether the candidate is on hold.
    pub is_on_hold: bool,
}

/// Queue operations for one caller identity and session.
pub struct WorkQueue<T: Transport> {
    executor: Executor<T>,
    locks: LockManager<T>,
}

impl<T: Transport> WorkQueue<T> {
    /// Queue facade over an executor and this caller's lock manager.
    pub fn new(executor: Executor<T>, locks: LockManager<T>) -> Self {
        Self { executor, locks }
    }

    /// The lock manager candidates are acquired through.
    pub fn locks(&self) -> &LockManager<T> {
        &self.locks
    }

    /// Ranks and pages the queue's current candidates.
    ///
    /// Candidates holding a live lock from a foreign (identity, session)
    /// are excluded; candidates on hold are excluded unless
    /// `include_on_hold` is set.
    pub fn peek(
        &self,
        queue: &QueueDef,
        offset: u64,
        count: u64,
        include_on_hold: bool,
    ) -> Result<Vec<QueueCandidate>> {
        if queue.members.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.peek_statement(queue, offset, count, include_on_hold)?;
        let documents = self.executor.fetch(&query)?;
        Ok(documents.into_iter().map(candidate_from).collect())
    }

    /// Selects the single best candidate and locks it.
    ///
    /// Empty selection, or a lock lost to the peek/lock race, returns
    /// `Ok(None)` and creates no lock row.
    pub fn dequeue(&self, queue: &QueueDef) -> Result<Option<(QueueCandidate, LockRecord)>> {
        let mut candidates = self.peek(queue, 0, 1, false)?;
        let Some(candidate) = candidates.pop() else {
            return Ok(None);
        };
        let target = candidate.document.id()?;
        match self.locks.lock(&target)? {
            Some(lock) => Ok(Some((candidate, lock))),
            None => {
                debug!(record = %target, "dequeue candidate locked in the race window");
                Ok(None)
            }
        }
    }

    /// Puts a candidate on hold. Idempotent.
    pub fn hold(&self, queue: &QueueId, candidate: &RecordId) -> Result<QueueOverride> {
        self.set_hold(queue, candidate, true)
    }

    /// Releases a candidate's hold. Idempotent.
    pub fn release(
        &self,
        queue: &QueueId,
        candidate: &RecordId,
    ) -> Result<QueueOverride> {
        self.set_hold(queue, candidate, false)
    }

    /// Sums the member queries' candidate counts in one statement.
    pub fn queued_count(&self, queue: &QueueDef) -> Result<u64> {
        if queue.members.is_empty() {
            return Ok(0);
        }
        let registry = Arc::clone(self.executor.registry());
        let mut generator = Generator::new(&registry);
        let mut statement = Block::default();
        let mut terms = Vec::new();
        for member in &queue.members {
            let steps = self.member_steps(member)?;
            let set = generator.candidate_set(&steps)?;
            for clause in set.lets {
                statement.push(clause);
            }
            terms.push(format!("LENGTH({})", set.expr));
        }
        statement.push(Clause::Return(terms.join(" + ")));
        let query = AqlQuery::text(statement.render());
        let rows = self.executor.transport().run(&query)?;
        rows.first()
            .and_then(Value::as_u64)
            .ok_or_else(|| BasaltError::Malformed("queue count row is not a number".into()))
    }

    fn member_steps(&self, member: &QueueMember) -> Result<Vec<Step>> {
        let steps = parse_query(&member.query, self.executor.registry())?;
        let paths = steps
            .iter()
            .any(|step| matches!(step, Step::Return(ReturnShape::Paths)));
        if paths {
            return Err(BasaltError::CodegenInvariant(
                "queue member query must return nodes",
            ));
        }
        Ok(steps)
    }

    fn peek_statement(
        &self,
        queue: &QueueDef,
        offset: u64,
        count: u64,
        include_on_hold: bool,
    ) -> Result<AqlQuery> {
        let registry = Arc::clone(self.executor.registry());
        let overrides = registry.override_collection().to_owned();
        let locks = registry.lock_collection().to_owned();
        let mut generator = Generator::new(&registry);
        let mut statement = Block::default();
        let mut member_vars = Vec::new();

        for member in &queue.members {
            let steps = self.member_steps(member)?;
            let set = generator.candidate_set(&steps)?;
            for clause in set.lets {
                statement.push(clause);
            }

            let mut annotate = Block::default();
            annotate.push(Clause::For {
                var: "c".into(),
                source: set.expr,
            });

            let mut override_block = Block::default();
            override_block.push(Clause::For {
                var: "o".into(),
                source: overrides.clone(),
            });
            override_block.push(Clause::Filter("o._from == @queue".into()));
            override_block.push(Clause::Filter("o._to == c._id".into()));
            override_block.push(Clause::Filter(format!(
                "o.ModelType == '{}'",
                QueueOverride::MODEL_TYPE
            )));
            override_block.push(Clause::Filter("o.IsDeleted != true".into()));
            override_block.push(Clause::Return("o".into()));
            annotate.push(Clause::LetBlock {
                var: "ov".into(),
                block: override_block,
            });

            let mut lock_block = Block::default();
            lock_block.push(Clause::For {
                var: "l".into(),
                source: locks.clone(),
            });
            lock_block.push(Clause::Filter("l._to == c._id".into()));
            lock_block.push(Clause::Filter(format!(
                "l.ModelType == '{}'",
                LockRecord::MODEL_TYPE
            )));
            lock_block.push(Clause::Filter("l.IsDeleted != true".into()));
            lock_block.push(Clause::Filter("l.Expires > @now".into()));
            lock_block.push(Clause::Filter(
                "(l._from != @holder || l.SecuritySessionId != @session)".into(),
            ));
            lock_block.push(Clause::Return("l".into()));
            annotate.push(Clause::LetBlock {
                var: "lk".into(),
                block: lock_block,
            });

            annotate.push(Clause::Filter("LENGTH(lk) == 0".into()));
            if !include_on_hold {
                annotate.push(Clause::Filter(
                    "LENGTH(ov) == 0 || FIRST(ov).IsOnHold != true".into(),
                ));
            }
            annotate.push(Clause::Return(format!(
                "MERGE(c, {{ Rank: {}, ForcedRank: LENGTH(ov) == 0 ? 0 : FIRST(ov).ForcedRank, IsOnHold: LENGTH(ov) == 0 ? false : FIRST(ov).IsOnHold }})",
                member.rank
            )));

            let member_var = format!("m{}", member_vars.len());
            statement.push(Clause::LetBlock {
                var: member_var.clone(),
                block: annotate,
            });
            member_vars.push(member_var);
        }

        let combined = if member_vars.len() == 1 {
            member_vars.remove(0)
        } else {
            format!("UNION_DISTINCT({})", member_vars.join(", "))
        };
        statement.push(Clause::For {
            var: "r".into(),
            source: combined,
        });
        statement.push(Clause::Sort(vec![
            "r.ForcedRank DESC".into(),
            "r.Rank DESC".into(),
        ]));
        statement.push(Clause::Limit { offset, count });
        statement.push(Clause::Return("r".into()));

        Ok(AqlQuery::text(statement.render())
            .bind("queue", json!(queue.id.0))
            .bind("now", json!(now_millis()))
            .bind("holder", json!(self.locks.identity().id.0))
            .bind("session", json!(self.locks.session().0)))
    }

    fn set_hold(
        &self,
        queue: &QueueId,
        candidate: &RecordId,
        on_hold: bool,
    ) -> Result<QueueOverride> {
        let overrides = self.executor.registry().override_collection().to_owned();
        let text = format!(
            "UPSERT {{ _from: @queue, _to: @candidate, ModelType: '{model}' }}
  INSERT {{ _from: @queue, _to: @candidate, ModelType: '{model}', ForcedRank: 0, IsOnHold: @hold, IsDeleted: false }}
  UPDATE {{ IsOnHold: @hold }}
  IN {overrides}
RETURN NEW",
            model = QueueOverride::MODEL_TYPE,
        );
        let query = AqlQuery::text(text)
            .bind("queue", json!(queue.0))
            .bind("candidate", json!(candidate.0))
            .bind("hold", json!(on_hold));
        let rows = self.executor.transport().run(&query)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| BasaltError::Malformed("override upsert returned no row".into()))?;
        Ok(override_from(&row))
    }
}

fn candidate_from(document: Document) -> QueueCandidate {
    let rank = document.get("Rank").and_then(Value::as_i64).unwrap_or(0);
    let forced_rank = document
        .get("ForcedRank")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let is_on_hold = document
        .get("IsOnHold")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    QueueCandidate {
        document,
        rank,
        forced_rank,
        is_on_hold,
    }
}

fn override_from(row: &Value) -> QueueOverride {
    QueueOverride {
        forced_rank: row.get("ForcedRank").and_then(Value::as_i64).unwrap_or(0),
        is_on_hold: row.get("IsOnHold").and_then(Value::as_bool).unwrap_or(false),
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

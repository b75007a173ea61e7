//! Authorization and audit capability seams.
//!
//! Policy evaluation and audit storage are collaborator concerns; the
//! executor only needs these two traits. Permissive defaults exist for
//! tests and prototyping.

use crate::model::Document;
use crate::types::RecordId;

/// The caller's security identity (the record id of its principal).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    /// Principal record id, used as the `_from` of lock rows.
    pub id: RecordId,
}

impl Identity {
    /// Identity from a principal record id.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self { id: id.into() }
    }
}

/// Action kind checked by the policy and reported to the audit sink.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Read access.
    Read,
    /// Record creation.
    Create,
    /// Record mutation.
    Update,
    /// Record deletion.
    Delete,
}

/// Reason string returned by a refusing policy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeniedReason(pub String);

/// Per-record authorization check.
pub trait AccessPolicy: Send + Sync {
    /// Demands access; an `Err` aborts the whole read or write.
    fn demand(
        &self,
        identity: &Identity,
        record: &Document,
        action: Action,
    ) -> Result<(), DeniedReason>;
}

/// Read/write reporting.
pub trait AuditSink: Send + Sync {
    /// Reports one completed operation over the given records.
    fn record(&self, identity: &Identity, records: &[RecordId], action: Action);
}

/// Policy that grants everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn demand(
        &self,
        _identity: &Identity,
        _record: &Document,
        _action: Action,
    ) -> Result<(), DeniedReason> {
        Ok(())
    }
}

/// Audit sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _identity: &Identity, _records: &[RecordId], _action: Action) {}
}

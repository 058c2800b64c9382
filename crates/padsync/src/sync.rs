//! Sync engine for operational transformation against a central server.
//!
//! This module tracks how a local document relates to the server's log:
//!
//! - `revision`: how many log entries this client has incorporated
//! - `outstanding`: the one edit sent to the server and not yet acknowledged
//! - `buffer`: local edits made since, composed into one operation
//!
//! Only the acknowledgment path promotes `buffer` to `outstanding`, so at
//! most one edit is ever in flight. Together, `outstanding` followed by
//! `buffer` is exactly the set of local edits the server has not yet seen.

use std::collections::BTreeMap;

use opseq::OperationSeq;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::message::{ClientMsg, UserInfo, UserOperation};

/// Where the engine stands with respect to unacknowledged edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing in flight
    Idle,
    /// One edit in flight, nothing buffered
    Pending,
    /// One edit in flight and more buffered behind it
    Batching,
}

/// What replaying a history batch produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryOutcome {
    /// Remote operations to apply to the local text, in order.
    pub remote: Vec<OperationSeq>,
    /// Messages to send, in order.
    pub outgoing: Vec<ClientMsg>,
}

/// Sync engine for a single document.
#[derive(Clone, Debug, Default)]
pub struct SyncEngine {
    /// Author id assigned by the server for the current connection
    me: Option<u64>,
    /// Number of log entries incorporated
    revision: usize,
    /// Sent, awaiting acknowledgment
    outstanding: Option<OperationSeq>,
    /// Local edits made while `outstanding` is in flight
    buffer: Option<OperationSeq>,
    /// Other users in the session
    users: BTreeMap<u64, UserInfo>,
    /// Document language, once known
    language: Option<String>,
}

impl SyncEngine {
    /// Create an engine for an empty document at revision 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current author id, if the server has assigned one.
    pub fn me(&self) -> Option<u64> {
        self.me
    }

    /// Number of log entries incorporated.
    pub fn revision(&self) -> usize {
        self.revision
    }

    /// The edit in flight.
    pub fn outstanding(&self) -> Option<&OperationSeq> {
        self.outstanding.as_ref()
    }

    /// Local edits waiting for the edit in flight.
    pub fn buffer(&self) -> Option<&OperationSeq> {
        self.buffer.as_ref()
    }

    /// Check if an edit is awaiting acknowledgment.
    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        match (&self.outstanding, &self.buffer) {
            (None, _) => SyncState::Idle,
            (Some(_), None) => SyncState::Pending,
            (Some(_), Some(_)) => SyncState::Batching,
        }
    }

    /// Other users in the session, by author id.
    pub fn users(&self) -> &BTreeMap<u64, UserInfo> {
        &self.users
    }

    /// The document language, once known.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    // ========== Identity and roster ==========

    /// Record the author id for this connection.
    pub fn set_identity(&mut self, id: u64) {
        debug!("Assigned identity {}", id);
        self.me = Some(id);
    }

    /// Forget the author id; a new connection may be given another one.
    pub fn reset_identity(&mut self) {
        self.me = None;
    }

    /// Drop the roster; the server resends it on every connection.
    pub fn reset_users(&mut self) {
        self.users.clear();
    }

    /// Apply a roster update. Returns whether the roster changed.
    ///
    /// Updates about this client itself are ignored.
    pub fn update_user(&mut self, id: u64, info: Option<UserInfo>) -> bool {
        if self.me == Some(id) {
            return false;
        }
        match info {
            Some(info) => {
                self.users.insert(id, info);
                true
            }
            None => self.users.remove(&id).is_some(),
        }
    }

    /// Record the document language.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    // ========== Local edits ==========

    /// Record a local edit, already applied to the local text.
    ///
    /// Returns the message to send when nothing was in flight; otherwise the
    /// edit is composed into the buffer and sent after the next
    /// acknowledgment.
    pub fn local_edit(&mut self, operation: OperationSeq) -> SyncResult<Option<ClientMsg>> {
        if self.outstanding.is_none() {
            let msg = self.edit_message(&operation);
            self.outstanding = Some(operation);
            return Ok(Some(msg));
        }
        self.buffer = Some(match self.buffer.take() {
            Some(buffer) => buffer.compose(&operation)?,
            None => operation,
        });
        Ok(None)
    }

    /// The message resubmitting the edit in flight, after a reconnect.
    pub fn resend_outstanding(&self) -> Option<ClientMsg> {
        self.outstanding.as_ref().map(|op| self.edit_message(op))
    }

    fn edit_message(&self, operation: &OperationSeq) -> ClientMsg {
        ClientMsg::Edit {
            revision: self.revision,
            operation: operation.clone(),
        }
    }

    // ========== Server history ==========

    /// Replay a history batch starting at revision `start`.
    ///
    /// Entries this client already has are skipped. A batch starting past
    /// the local revision cannot be reconciled and is rejected untouched.
    /// A batch that fails partway leaves the engine as it was before the
    /// call.
    pub fn handle_history(
        &mut self,
        start: usize,
        operations: Vec<UserOperation>,
    ) -> SyncResult<HistoryOutcome> {
        if start > self.revision {
            warn!(
                "History starts at {} but local revision is {}",
                start, self.revision
            );
            return Err(SyncError::ProtocolViolation {
                start,
                revision: self.revision,
            });
        }

        let snapshot = (self.revision, self.outstanding.clone(), self.buffer.clone());
        let known = self.revision - start;
        let result = self.replay(operations.into_iter().skip(known));
        if let Err(e) = &result {
            warn!("Discarding history batch from {}: {}", start, e);
            (self.revision, self.outstanding, self.buffer) = snapshot;
        }
        result
    }

    fn replay(
        &mut self,
        entries: impl Iterator<Item = UserOperation>,
    ) -> SyncResult<HistoryOutcome> {
        let mut outcome = HistoryOutcome::default();
        for entry in entries {
            if Some(entry.id) == self.me {
                if let Some(msg) = self.server_ack() {
                    outcome.outgoing.push(msg);
                }
            } else {
                outcome.remote.push(self.apply_server(entry.operation)?);
            }
            self.revision += 1;
        }
        Ok(outcome)
    }

    /// The server confirmed the edit in flight; send the buffer next.
    fn server_ack(&mut self) -> Option<ClientMsg> {
        if self.outstanding.is_none() {
            warn!("{}", SyncError::AckWithoutOutstanding);
            return None;
        }
        self.outstanding = self.buffer.take();
        self.resend_outstanding()
    }

    /// Transform a remote operation past the local unacknowledged edits.
    ///
    /// The remote operation goes through `outstanding` first and `buffer`
    /// second, mirroring the order those edits will reach the server in.
    fn apply_server(&mut self, operation: OperationSeq) -> SyncResult<OperationSeq> {
        let Some(outstanding) = &self.outstanding else {
            return Ok(operation);
        };
        let (outstanding, operation) = outstanding.transform(&operation)?;
        let (buffer, operation) = match &self.buffer {
            Some(buffer) => {
                let (buffer, operation) = buffer.transform(&operation)?;
                (Some(buffer), operation)
            }
            None => (None, operation),
        };
        self.outstanding = Some(outstanding);
        self.buffer = buffer;
        Ok(operation)
    }
}

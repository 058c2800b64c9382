//! Wire protocol messages.
//!
//! Every frame is a UTF-8 JSON object with exactly one key naming the
//! message, e.g. `{"Identity": 4}` or `{"Edit": {"revision": 2, "operation": [1, "x"]}}`.
//! Offsets in cursor data are Unicode codepoints.

use opseq::OperationSeq;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Display identity of a collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Display name
    pub name: String,
    /// Color hue in degrees, `0..360`
    pub hue: u32,
}

impl UserInfo {
    /// Create user info, wrapping the hue into `0..360`.
    pub fn new(name: impl Into<String>, hue: u32) -> Self {
        Self {
            name: name.into(),
            hue: hue % 360,
        }
    }
}

/// Cursor positions and selections of one user, in codepoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    pub cursors: Vec<usize>,
    pub selections: Vec<(usize, usize)>,
}

/// One entry of the server's operation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOperation {
    /// Author id
    pub id: u64,
    pub operation: OperationSeq,
}

/// A message sent from the client to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMsg {
    /// Submit an operation built against `revision`.
    Edit {
        revision: usize,
        operation: OperationSeq,
    },
    /// Change the document's language.
    SetLanguage(String),
    /// Announce this client's display identity.
    ClientInfo(UserInfo),
    /// Announce this client's cursors and selections.
    CursorData(CursorData),
}

impl ClientMsg {
    /// Encode as a text frame.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A message sent from the server to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMsg {
    /// Assigns this connection's author id.
    Identity(u64),
    /// Operations from the log, starting at revision `start`.
    History {
        start: usize,
        operations: Vec<UserOperation>,
    },
    /// The document's language changed.
    Language(String),
    /// A user joined or changed identity; `None` means the user left.
    UserInfo { id: u64, info: Option<UserInfo> },
    /// A user's cursors moved.
    UserCursor { id: u64, data: CursorData },
}

impl ServerMsg {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

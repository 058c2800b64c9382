//! Client-side synchronization for collaborative plain-text editing.
//!
//! Each client keeps a local copy of the document and exchanges operations
//! with a central server that owns the authoritative log. Local edits apply
//! immediately; concurrent remote edits are transformed past the local edits
//! the server has not yet acknowledged, so every client converges on the
//! server's text.
//!
//! # Modules
//!
//! - `sync`: Revision counting and the outstanding/buffer discipline
//! - `session`: One document session wiring sync, presence and the editor host
//! - `host`: The widget seam, in UTF-16 offsets, plus a plain text buffer
//! - `position`: UTF-16 and codepoint offset conversion
//! - `presence`: Remote cursors, selections and their styling
//! - `connection`: Reconnect scheduling and desynchronization detection
//! - `message`: JSON wire messages
//! - `config`: Session configuration
//! - `error`: Error types for the sync client
//!
//! # Example
//!
//! ```
//! use padsync::{ClientConfig, ServerMsg, Session, TextBuffer, TextEdit};
//!
//! let mut session = Session::new(ClientConfig::default(), TextBuffer::new(), ());
//! session.begin_connect();
//! session.on_open();
//! session.handle_text(r#"{"Identity": 1}"#).unwrap();
//!
//! session.edit(&[TextEdit::insert(0, "hi")]).unwrap();
//! while let Some(msg) = session.next_outgoing() {
//!     // Write `msg.to_json()` to the socket.
//!     let _ = msg;
//! }
//!
//! // The server echoes the edit back as an acknowledgment.
//! session
//!     .handle_message(ServerMsg::from_json(
//!         r#"{"History": {"start": 0, "operations": [{"id": 1, "operation": ["hi"]}]}}"#,
//!     ).unwrap())
//!     .unwrap();
//! assert_eq!(session.revision(), 1);
//! assert_eq!(session.host().text(), "hi");
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod message;
pub mod position;
pub mod presence;
pub mod session;
pub mod sync;

/// WebSocket transport on tokio.
///
/// This module is only available when the `transport` feature is enabled.
#[cfg(feature = "transport")]
pub mod transport;

pub use config::{socket_uri, ClientConfig};
pub use connection::{CloseOutcome, ConnectionManager, ConnectionState};
pub use error::{SyncError, SyncResult};
pub use host::{EditorHost, SelectionState, TextBuffer, TextEdit};
pub use message::{ClientMsg, CursorData, ServerMsg, UserInfo, UserOperation};
pub use presence::{CursorCoordinator, CursorStyle, Decoration, DecorationKind};
pub use session::{Session, SessionObserver, UNSAVED_EDITS_WARNING};
pub use sync::{HistoryOutcome, SyncEngine, SyncState};

pub use opseq::{OperationSeq, OtError};

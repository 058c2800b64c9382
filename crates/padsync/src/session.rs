//! A collaborative editing session for one document.
//!
//! [`Session`] is the single owner of a document's sync state. Every event,
//! local or remote, goes through one `&mut self` method and is handled to
//! completion before the next, so the engine's `outstanding`, `buffer` and
//! `revision` never need a lock. Outgoing messages collect in an outbox that
//! the transport drains after each event.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use opseq::OperationSeq;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connection::{CloseOutcome, ConnectionManager, ConnectionState};
use crate::error::{SyncError, SyncResult};
use crate::host::{EditorHost, SelectionState, TextEdit};
use crate::message::{ClientMsg, CursorData, ServerMsg, UserInfo};
use crate::position::{edits_for_operation, operation_for_changes, PositionTranslator};
use crate::presence::{CursorCoordinator, CursorStyle};
use crate::sync::{SyncEngine, SyncState};

/// Receives session notifications for the UI layer.
///
/// All methods default to doing nothing.
pub trait SessionObserver {
    /// The socket opened.
    fn on_connected(&mut self) {}

    /// A live socket closed; reconnecting will be attempted.
    fn on_disconnected(&mut self) {}

    /// Too many disconnects; the session must be reloaded.
    fn on_desynchronized(&mut self) {}

    /// The document language changed.
    fn on_change_language(&mut self, _language: &str) {}

    /// The roster of other users changed.
    fn on_change_users(&mut self, _users: &BTreeMap<u64, UserInfo>) {}
}

/// An observer that ignores everything.
impl SessionObserver for () {}

/// Warning shown when leaving while an edit has not reached the server.
pub const UNSAVED_EDITS_WARNING: &str =
    "Your latest changes have not reached the server yet and would be lost.";

/// Sync session over an editor host.
pub struct Session<H, O> {
    config: ClientConfig,
    engine: SyncEngine,
    cursors: CursorCoordinator,
    connection: ConnectionManager,
    host: H,
    observer: O,
    /// The text as of the last local or remote change
    text: String,
    info: Option<UserInfo>,
    outbox: VecDeque<ClientMsg>,
}

impl<H: EditorHost, O: SessionObserver> Session<H, O> {
    /// Create a session for an empty document.
    pub fn new(config: ClientConfig, host: H, observer: O) -> Self {
        Self {
            cursors: CursorCoordinator::new(config.cursor_debounce),
            connection: ConnectionManager::new(&config),
            config,
            engine: SyncEngine::new(),
            host,
            observer,
            text: String::new(),
            info: None,
            outbox: VecDeque::new(),
        }
    }

    /// The session configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The editor host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The editor host, for changes that bypass the session such as caret moves.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// The current text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of server log entries incorporated.
    pub fn revision(&self) -> usize {
        self.engine.revision()
    }

    /// The sync engine.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Unacknowledged edit state.
    pub fn sync_state(&self) -> SyncState {
        self.engine.state()
    }

    /// Connection status.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Check if the session must be reloaded.
    pub fn is_desynchronized(&self) -> bool {
        self.connection.is_desynchronized()
    }

    /// Other users in the session.
    pub fn users(&self) -> &BTreeMap<u64, UserInfo> {
        self.engine.users()
    }

    /// The document language, once known.
    pub fn language(&self) -> Option<&str> {
        self.engine.language()
    }

    /// Style rules for every remote user color seen so far.
    pub fn cursor_styles(&self) -> impl Iterator<Item = &CursorStyle> {
        self.cursors.styles()
    }

    /// A warning to show before teardown while an edit is outstanding.
    pub fn exit_guard(&self) -> Option<&'static str> {
        self.engine.has_outstanding().then_some(UNSAVED_EDITS_WARNING)
    }

    /// Next message to send.
    pub fn next_outgoing(&mut self) -> Option<ClientMsg> {
        self.outbox.pop_front()
    }

    /// Queue a message, dropping it while disconnected.
    ///
    /// Everything worth keeping is resent on connect, so nothing is queued
    /// across a disconnect.
    fn send(&mut self, msg: ClientMsg) {
        if self.connection.is_connected() {
            self.outbox.push_back(msg);
        } else {
            debug!("Not connected, dropping {:?}", msg);
        }
    }

    // ========== Local events ==========

    /// Record changes the host has already applied.
    ///
    /// All changes refer to the text before the batch, in UTF-16 offsets.
    pub fn local_changes(&mut self, changes: &[TextEdit]) -> SyncResult<()> {
        let (operation, text) = operation_for_changes(&self.text, changes)?;
        if operation.is_noop() {
            return Ok(());
        }
        self.commit_local(operation, text)
    }

    /// Apply changes to the host, then record them.
    pub fn edit(&mut self, changes: &[TextEdit]) -> SyncResult<()> {
        let (operation, text) = operation_for_changes(&self.text, changes)?;
        if operation.is_noop() {
            return Ok(());
        }
        let edits = edits_for_operation(&self.text, &operation);
        self.host.apply_edits(&edits);
        self.commit_local(operation, text)
    }

    fn commit_local(&mut self, operation: OperationSeq, text: String) -> SyncResult<()> {
        self.text = text;
        self.cursors.transform(&operation);
        if let Some(msg) = self.engine.local_edit(operation)? {
            self.send(msg);
        }
        self.refresh_decorations();
        self.sync_host_cursor(Instant::now());
        Ok(())
    }

    /// The host's own cursors or selections moved.
    pub fn local_cursor(&mut self, state: SelectionState, now: Instant) {
        let translator = PositionTranslator::new(&self.text);
        let data = CursorData {
            cursors: state
                .cursors
                .iter()
                .map(|&c| translator.to_codepoint(c))
                .collect(),
            selections: state
                .selections
                .iter()
                .map(|&(s, e)| (translator.to_codepoint(s), translator.to_codepoint(e)))
                .collect(),
        };
        self.cursors.set_own(data, now);
    }

    /// Read the host's cursor state and record it.
    ///
    /// Unchanged positions leave the debounce window alone.
    pub fn sync_host_cursor(&mut self, now: Instant) {
        let state = self.host.selection_state();
        self.local_cursor(state, now);
    }

    /// When the pending own cursor change should be sent.
    pub fn cursor_deadline(&self) -> Option<Instant> {
        self.cursors.flush_deadline()
    }

    /// Send the own cursor if its debounce window has passed.
    pub fn flush_cursor(&mut self, now: Instant) {
        if let Some(data) = self.cursors.take_due(now) {
            self.send(ClientMsg::CursorData(data));
        }
    }

    /// Change the document language for everyone.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.send(ClientMsg::SetLanguage(language.into()));
    }

    /// Set this client's display identity.
    pub fn set_info(&mut self, info: UserInfo) {
        self.info = Some(info.clone());
        self.send(ClientMsg::ClientInfo(info));
    }

    // ========== Inbound messages ==========

    /// Handle a text frame from the server.
    ///
    /// Frames that do not decode are dropped. An error means the connection
    /// must be closed.
    pub fn handle_text(&mut self, text: &str) -> SyncResult<()> {
        match ServerMsg::from_json(text) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => {
                warn!("Dropping unreadable server message: {}", e);
                Ok(())
            }
        }
    }

    /// Handle a decoded server message.
    pub fn handle_message(&mut self, msg: ServerMsg) -> SyncResult<()> {
        match msg {
            ServerMsg::Identity(id) => self.engine.set_identity(id),
            ServerMsg::History { start, operations } => {
                debug!("History from {} with {} entries", start, operations.len());
                let rollback = self.engine.clone();
                let outcome = self.engine.handle_history(start, operations)?;
                let (text, steps) = match stage_remote(&self.text, &outcome.remote) {
                    Ok(staged) => staged,
                    Err(e) => {
                        warn!("History from {} does not fit the text: {}", start, e);
                        self.engine = rollback;
                        return Err(e);
                    }
                };
                self.commit_remote(text, steps);
                for msg in outcome.outgoing {
                    self.send(msg);
                }
            }
            ServerMsg::Language(language) => {
                self.engine.set_language(language.clone());
                self.observer.on_change_language(&language);
            }
            ServerMsg::UserInfo { id, info } => {
                let left = info.is_none();
                if self.engine.update_user(id, info) {
                    if left {
                        self.cursors.remove_user(id);
                    }
                    self.refresh_decorations();
                    self.observer.on_change_users(self.engine.users());
                }
            }
            ServerMsg::UserCursor { id, data } => {
                if self.engine.me() != Some(id) {
                    self.cursors.set_remote(id, data);
                    self.refresh_decorations();
                }
            }
        }
        Ok(())
    }

    fn commit_remote(&mut self, text: String, steps: Vec<(Vec<TextEdit>, &OperationSeq)>) {
        if steps.is_empty() {
            return;
        }
        self.text = text;
        for (edits, operation) in steps {
            self.host.apply_edits(&edits);
            self.cursors.transform(operation);
        }
        self.refresh_decorations();
        self.sync_host_cursor(Instant::now());
    }

    fn refresh_decorations(&mut self) {
        let translator = PositionTranslator::new(&self.text);
        let decorations: Vec<_> = self
            .cursors
            .decorations(self.engine.users())
            .into_iter()
            .map(|d| d.map_offsets(|offset| translator.to_utf16(offset)))
            .collect();
        self.host.render_decorations(&decorations);
    }

    // ========== Connection lifecycle ==========

    /// Start a connection attempt unless one is in flight or open.
    pub fn begin_connect(&mut self) -> bool {
        self.connection.begin_connect()
    }

    /// One reconnect interval elapsed. Returns whether to start an attempt.
    pub fn tick(&mut self) -> bool {
        self.connection.tick()
    }

    /// The socket opened.
    ///
    /// The server keeps no record of this client across connections, so
    /// the roster starts over and identity, cursor and the edit in flight
    /// are all sent again.
    pub fn on_open(&mut self) {
        self.connection.on_open();
        if !self.connection.is_connected() {
            return;
        }
        self.engine.reset_users();
        self.refresh_decorations();
        self.observer.on_connected();
        self.observer.on_change_users(self.engine.users());

        if let Some(info) = self.info.clone() {
            self.send(ClientMsg::ClientInfo(info));
        }
        self.sync_host_cursor(Instant::now());
        self.send(ClientMsg::CursorData(self.cursors.own().clone()));
        self.cursors.mark_sent();
        if let Some(msg) = self.engine.resend_outstanding() {
            self.send(msg);
        }
    }

    /// The socket closed or the attempt in flight failed.
    pub fn on_close(&mut self) -> CloseOutcome {
        let outcome = self.connection.on_close();
        self.engine.reset_identity();
        self.outbox.clear();
        match outcome {
            CloseOutcome::AttemptFailed => {}
            CloseOutcome::Disconnected => self.observer.on_disconnected(),
            CloseOutcome::Desynchronized => {
                self.observer.on_disconnected();
                self.observer.on_desynchronized();
            }
        }
        outcome
    }

    /// Stop the session: no further attempts, no pending messages.
    pub fn dispose(&mut self) {
        self.connection.dispose();
        self.cursors.dispose();
        self.outbox.clear();
    }

    /// Fail fast on a session that can no longer sync.
    pub fn ensure_synchronized(&self) -> SyncResult<()> {
        if self.is_desynchronized() {
            Err(SyncError::Desynchronized)
        } else {
            Ok(())
        }
    }
}

/// Apply remote operations to a copy of `text`.
///
/// Returns the final text and the host edits for each operation that
/// changes something. Fails without side effects if any operation does not
/// fit.
fn stage_remote<'a>(
    text: &str,
    operations: &'a [OperationSeq],
) -> SyncResult<(String, Vec<(Vec<TextEdit>, &'a OperationSeq)>)> {
    let mut text = text.to_owned();
    let mut steps = Vec::new();
    for operation in operations.iter().filter(|op| !op.is_noop()) {
        let next = operation.apply(&text)?;
        steps.push((edits_for_operation(&text, operation), operation));
        text = next;
    }
    Ok((text, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TextBuffer;
    use crate::message::UserOperation;
    use crate::sync::SyncState;

    #[derive(Default)]
    struct Recorder {
        connected: usize,
        disconnected: usize,
        desynchronized: usize,
        languages: Vec<String>,
        roster_sizes: Vec<usize>,
    }

    impl SessionObserver for Recorder {
        fn on_connected(&mut self) {
            self.connected += 1;
        }
        fn on_disconnected(&mut self) {
            self.disconnected += 1;
        }
        fn on_desynchronized(&mut self) {
            self.desynchronized += 1;
        }
        fn on_change_language(&mut self, language: &str) {
            self.languages.push(language.to_owned());
        }
        fn on_change_users(&mut self, users: &BTreeMap<u64, UserInfo>) {
            self.roster_sizes.push(users.len());
        }
    }

    fn connected_session() -> Session<TextBuffer, Recorder> {
        let mut session = Session::new(ClientConfig::default(), TextBuffer::new(), Recorder::default());
        assert!(session.begin_connect());
        session.on_open();
        session.handle_message(ServerMsg::Identity(1)).unwrap();
        drain(&mut session);
        session
    }

    fn drain<H: EditorHost, O: SessionObserver>(session: &mut Session<H, O>) -> Vec<ClientMsg> {
        std::iter::from_fn(|| session.next_outgoing()).collect()
    }

    fn remote(id: u64, build: impl FnOnce(&mut OperationSeq)) -> UserOperation {
        let mut operation = OperationSeq::new();
        build(&mut operation);
        UserOperation { id, operation }
    }

    #[test]
    fn test_on_open_sends_info_cursor_and_outstanding() {
        let mut session = connected_session();
        session.set_info(UserInfo::new("Ada", 30));
        session.edit(&[TextEdit::insert(0, "hi")]).unwrap();
        drain(&mut session);

        session.on_close();
        session.tick();
        session.on_open();
        let sent = drain(&mut session);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], ClientMsg::ClientInfo(UserInfo::new("Ada", 30)));
        assert!(matches!(sent[1], ClientMsg::CursorData(_)));
        assert!(matches!(sent[2], ClientMsg::Edit { revision: 0, .. }));
        assert_eq!(session.observer().connected, 2);
    }

    #[test]
    fn test_edit_applies_to_host_and_sends() {
        let mut session = connected_session();
        session.edit(&[TextEdit::insert(0, "ab")]).unwrap();
        assert_eq!(session.text(), "ab");
        assert_eq!(session.host().text(), "ab");
        let sent = drain(&mut session);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_json().unwrap(), r#"{"Edit":{"revision":0,"operation":["ab"]}}"#);
        assert!(session.exit_guard().is_some());
    }

    #[test]
    fn test_messages_dropped_while_disconnected() {
        let mut session = Session::new(ClientConfig::default(), TextBuffer::new(), Recorder::default());
        session.edit(&[TextEdit::insert(0, "x")]).unwrap();
        session.set_language("rust");
        assert!(session.next_outgoing().is_none());
        assert_eq!(session.sync_state(), SyncState::Pending);
    }

    #[test]
    fn test_remote_history_updates_host() {
        let mut session = connected_session();
        session
            .handle_message(ServerMsg::History {
                start: 0,
                operations: vec![
                    remote(2, |o| o.insert("hello")),
                    remote(2, |o| {
                        o.retain(5);
                        o.insert(" 😀");
                    }),
                ],
            })
            .unwrap();
        assert_eq!(session.text(), "hello 😀");
        assert_eq!(session.host().text(), "hello 😀");
        assert_eq!(session.revision(), 2);
    }

    #[test]
    fn test_unreadable_frames_are_dropped() {
        let mut session = connected_session();
        assert!(session.handle_text("{\"Nope\": 1}").is_ok());
        assert!(session.handle_text("garbage").is_ok());
        assert_eq!(session.revision(), 0);
    }

    #[test]
    fn test_history_ahead_is_error() {
        let mut session = connected_session();
        let err = session
            .handle_text(r#"{"History": {"start": 3, "operations": []}}"#)
            .unwrap_err();
        assert_eq!(err, SyncError::ProtocolViolation { start: 3, revision: 0 });
    }

    #[test]
    fn test_language_and_roster_callbacks() {
        let mut session = connected_session();
        session.handle_message(ServerMsg::Language("rust".into())).unwrap();
        session
            .handle_message(ServerMsg::UserInfo {
                id: 2,
                info: Some(UserInfo::new("Bo", 90)),
            })
            .unwrap();
        session
            .handle_message(ServerMsg::UserInfo {
                id: 1,
                info: Some(UserInfo::new("me", 0)),
            })
            .unwrap();
        assert_eq!(session.language(), Some("rust"));
        assert_eq!(session.observer().languages, vec!["rust".to_string()]);
        // One reset on open, one for user 2; updates about ourselves are ignored.
        assert_eq!(session.observer().roster_sizes, vec![0, 1]);
        assert_eq!(session.revision(), 0);
    }

    #[test]
    fn test_remote_cursor_rendered_in_utf16() {
        let mut session = connected_session();
        session.edit(&[TextEdit::insert(0, "😀😀ab")]).unwrap();
        session
            .handle_message(ServerMsg::UserInfo {
                id: 2,
                info: Some(UserInfo::new("Bo", 90)),
            })
            .unwrap();
        session
            .handle_message(ServerMsg::UserCursor {
                id: 2,
                data: CursorData {
                    cursors: vec![3],
                    selections: vec![],
                },
            })
            .unwrap();
        let decorations = session.host().decorations();
        assert_eq!(decorations.len(), 1);
        assert_eq!(decorations[0].start, 5);
        assert_eq!(decorations[0].class_name, "remote-cursor-90");

        // Typing before the remote cursor pushes it along.
        session.edit(&[TextEdit::insert(0, "x")]).unwrap();
        assert_eq!(session.host().decorations()[0].start, 6);

        session
            .handle_message(ServerMsg::UserInfo { id: 2, info: None })
            .unwrap();
        assert!(session.host().decorations().is_empty());
    }

    #[test]
    fn test_own_cursor_is_sent_after_debounce() {
        let mut session = connected_session();
        session.edit(&[TextEdit::insert(0, "a🦀b")]).unwrap();
        drain(&mut session);

        let now = Instant::now();
        session.local_cursor(
            SelectionState {
                cursors: vec![3],
                selections: vec![(0, 3)],
            },
            now,
        );
        session.flush_cursor(now);
        assert!(session.next_outgoing().is_none());

        let due = session.cursor_deadline().unwrap();
        session.flush_cursor(due);
        assert_eq!(
            drain(&mut session),
            vec![ClientMsg::CursorData(CursorData {
                cursors: vec![2],
                selections: vec![(0, 2)],
            })]
        );
    }

    #[test]
    fn test_desynchronized_after_repeated_disconnects() {
        let mut session = Session::new(ClientConfig::default(), TextBuffer::new(), Recorder::default());
        assert!(session.begin_connect());
        for _ in 0..5 {
            session.on_open();
            session.on_close();
            session.tick();
        }
        assert!(session.is_desynchronized());
        assert_eq!(session.ensure_synchronized(), Err(SyncError::Desynchronized));
        assert_eq!(session.observer().desynchronized, 1);
        assert_eq!(session.observer().disconnected, 5);
        for _ in 0..30 {
            assert!(!session.tick());
        }
    }

    #[test]
    fn test_failed_history_batch_leaves_session_untouched() {
        let mut session = connected_session();
        session.edit(&[TextEdit::insert(0, "a")]).unwrap();
        drain(&mut session);

        let err = session
            .handle_message(ServerMsg::History {
                start: 0,
                operations: vec![
                    remote(2, |o| o.insert("z")),
                    remote(2, |o| {
                        o.insert("q");
                        o.retain(7);
                    }),
                ],
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Ot(_)));
        assert_eq!(session.text(), "a");
        assert_eq!(session.host().text(), "a");
        assert_eq!(session.revision(), 0);
        assert_eq!(session.sync_state(), SyncState::Pending);
        assert!(session.exit_guard().is_some());
        assert!(drain(&mut session).is_empty());
    }

    #[test]
    fn test_history_that_does_not_fit_text_is_discarded() {
        let mut session = connected_session();
        let err = session
            .handle_message(ServerMsg::History {
                start: 0,
                operations: vec![
                    remote(2, |o| o.insert("hi")),
                    remote(2, |o| {
                        o.retain(9);
                        o.insert("!");
                    }),
                ],
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Ot(_)));
        assert_eq!(session.text(), "");
        assert_eq!(session.host().text(), "");
        assert_eq!(session.revision(), 0);

        // The same log delivered again applies from the start.
        session
            .handle_message(ServerMsg::History {
                start: 0,
                operations: vec![remote(2, |o| o.insert("hi"))],
            })
            .unwrap();
        assert_eq!(session.host().text(), "hi");
        assert_eq!(session.revision(), 1);
    }

    #[test]
    fn test_host_caret_moves_are_reported() {
        let caret = |at: usize| {
            ClientMsg::CursorData(CursorData {
                cursors: vec![at],
                selections: vec![],
            })
        };
        let mut session = connected_session();
        session.edit(&[TextEdit::insert(0, "abc")]).unwrap();
        assert_eq!(session.host().cursor(), 3);
        drain(&mut session);
        let due = session.cursor_deadline().unwrap();
        session.flush_cursor(due);
        assert_eq!(drain(&mut session), vec![caret(3)]);

        // Ack our edit, then a remote insert lands before the caret.
        session
            .handle_message(ServerMsg::History {
                start: 0,
                operations: vec![
                    remote(1, |o| o.insert("abc")),
                    remote(2, |o| {
                        o.insert("xy");
                        o.retain(3);
                    }),
                ],
            })
            .unwrap();
        assert_eq!(session.host().cursor(), 5);
        let due = session.cursor_deadline().unwrap();
        session.flush_cursor(due);
        assert_eq!(drain(&mut session), vec![caret(5)]);

        // A caret move made while offline goes out with the reconnect.
        session.on_close();
        session.host_mut().set_cursor(1);
        session.tick();
        session.on_open();
        assert_eq!(drain(&mut session), vec![caret(1)]);
        assert!(session.cursor_deadline().is_none());
    }
}

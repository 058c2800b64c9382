//! In-memory document server for integration tests.
//!
//! The server keeps the authoritative log the way a real one does: an
//! incoming edit built against revision `r` is transformed past every log
//! entry from `r` on, appended, and echoed to every connection. Messages
//! queue per client until the test delivers them, so tests decide how
//! edits interleave.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use padsync::{
    ClientConfig, ClientMsg, CursorData, OperationSeq, ServerMsg, Session, SessionObserver,
    TextBuffer, UserInfo, UserOperation,
};

/// Counts observer callbacks.
#[derive(Debug, Default)]
pub struct Recorder {
    pub connected: usize,
    pub disconnected: usize,
    pub desynchronized: usize,
    pub languages: Vec<String>,
    pub users: BTreeMap<u64, UserInfo>,
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
        self.users = users.clone();
    }
}

pub type Client = Session<TextBuffer, Recorder>;

pub fn new_client() -> Client {
    Session::new(ClientConfig::default(), TextBuffer::new(), Recorder::default())
}

struct Slot {
    session: Client,
    /// Connection id while connected
    id: Option<u64>,
    inbox: VecDeque<ServerMsg>,
}

/// Simulated server with its connected clients.
pub struct SimServer {
    text: String,
    history: Vec<UserOperation>,
    language: Option<String>,
    users: BTreeMap<u64, UserInfo>,
    cursors: BTreeMap<u64, CursorData>,
    next_id: u64,
    slots: Vec<Slot>,
}

impl SimServer {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            history: Vec::new(),
            language: None,
            users: BTreeMap::new(),
            cursors: BTreeMap::new(),
            next_id: 1,
            slots: Vec::new(),
        }
    }

    /// Add a client and connect it. Returns its index.
    pub fn add_client(&mut self) -> usize {
        self.slots.push(Slot {
            session: new_client(),
            id: None,
            inbox: VecDeque::new(),
        });
        let idx = self.slots.len() - 1;
        assert!(self.connect(idx));
        idx
    }

    pub fn client(&self, idx: usize) -> &Client {
        &self.slots[idx].session
    }

    pub fn client_mut(&mut self, idx: usize) -> &mut Client {
        &mut self.slots[idx].session
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn revision(&self) -> usize {
        self.history.len()
    }

    pub fn connection_id(&self, idx: usize) -> Option<u64> {
        self.slots[idx].id
    }

    /// Open a connection for a client that is ready for one.
    ///
    /// The greeting is queued right away: identity, the whole log, then
    /// language, roster and cursors of everyone else.
    pub fn connect(&mut self, idx: usize) -> bool {
        if !self.slots[idx].session.begin_connect() {
            return false;
        }
        self.slots[idx].session.on_open();

        let id = self.next_id;
        self.next_id += 1;
        let mut greeting = vec![
            ServerMsg::Identity(id),
            ServerMsg::History {
                start: 0,
                operations: self.history.clone(),
            },
        ];
        if let Some(language) = &self.language {
            greeting.push(ServerMsg::Language(language.clone()));
        }
        for (&user, info) in &self.users {
            greeting.push(ServerMsg::UserInfo {
                id: user,
                info: Some(info.clone()),
            });
        }
        for (&user, data) in &self.cursors {
            greeting.push(ServerMsg::UserCursor {
                id: user,
                data: data.clone(),
            });
        }

        let slot = &mut self.slots[idx];
        slot.id = Some(id);
        slot.inbox.extend(greeting);
        true
    }

    /// Drop a client's connection, discarding everything in flight both ways.
    pub fn disconnect(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        slot.session.on_close();
        slot.inbox.clear();
        if let Some(id) = slot.id.take() {
            self.cursors.remove(&id);
            if self.users.remove(&id).is_some() {
                self.broadcast(ServerMsg::UserInfo { id, info: None });
            }
        }
    }

    /// Process everything the client has sent. Returns the number of messages.
    pub fn receive(&mut self, idx: usize) -> usize {
        let Some(id) = self.slots[idx].id else {
            return 0;
        };
        let mut count = 0;
        while let Some(msg) = self.slots[idx].session.next_outgoing() {
            count += 1;
            self.handle(id, msg);
        }
        count
    }

    /// Hand everything queued for the client to its session.
    pub fn deliver(&mut self, idx: usize) -> usize {
        let slot = &mut self.slots[idx];
        let mut count = 0;
        while let Some(msg) = slot.inbox.pop_front() {
            count += 1;
            slot.session
                .handle_message(msg)
                .expect("client rejected server message");
        }
        count
    }

    /// Exchange messages until nothing is in flight.
    pub fn sync_all(&mut self) {
        loop {
            let mut moved = 0;
            for idx in 0..self.slots.len() {
                moved += self.receive(idx);
            }
            for idx in 0..self.slots.len() {
                moved += self.deliver(idx);
            }
            if moved == 0 {
                break;
            }
        }
    }

    /// Check every connected client shows the server's text.
    pub fn assert_converged(&self) {
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.id.is_none() {
                continue;
            }
            assert_eq!(slot.session.text(), self.text, "client {} text", idx);
            assert_eq!(slot.session.host().text(), self.text, "client {} host", idx);
            assert_eq!(slot.session.revision(), self.revision(), "client {} revision", idx);
        }
    }

    fn handle(&mut self, id: u64, msg: ClientMsg) {
        match msg {
            ClientMsg::Edit {
                revision,
                operation,
            } => {
                assert!(revision <= self.history.len(), "edit from the future");
                let operation = self.history[revision..]
                    .iter()
                    .try_fold(operation, |op, entry| {
                        op.transform(&entry.operation).map(|(op, _)| op)
                    })
                    .expect("edit does not fit the log");
                self.apply(id, operation);
            }
            ClientMsg::SetLanguage(language) => {
                self.language = Some(language.clone());
                self.broadcast(ServerMsg::Language(language));
            }
            ClientMsg::ClientInfo(info) => {
                self.users.insert(id, info.clone());
                self.broadcast(ServerMsg::UserInfo {
                    id,
                    info: Some(info),
                });
            }
            ClientMsg::CursorData(data) => {
                self.cursors.insert(id, data.clone());
                self.broadcast(ServerMsg::UserCursor { id, data });
            }
        }
    }

    fn apply(&mut self, id: u64, operation: OperationSeq) {
        self.text = operation.apply(&self.text).expect("edit does not fit the text");
        let start = self.history.len();
        let entry = UserOperation { id, operation };
        self.history.push(entry.clone());
        self.broadcast(ServerMsg::History {
            start,
            operations: vec![entry],
        });
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        for slot in &mut self.slots {
            if slot.id.is_some() {
                slot.inbox.push_back(msg.clone());
            }
        }
    }
}

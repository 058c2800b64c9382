//! Presence system for showing remote cursors and selections.
//!
//! The coordinator keeps every remote user's cursor data in codepoint
//! offsets, moves it through each operation applied to the document, and
//! derives the decorations a widget renders. It also coalesces this
//! client's own cursor changes before they are sent.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use opseq::OperationSeq;

use crate::message::{CursorData, UserInfo};

/// What a decoration marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecorationKind {
    /// A caret at `start` (`end == start`)
    Cursor,
    /// A highlighted range
    Selection,
}

/// A remote cursor or selection to render.
///
/// The coordinator produces offsets in codepoints; a session converts them
/// to UTF-16 before handing them to its host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoration {
    pub user_id: u64,
    pub kind: DecorationKind,
    pub start: usize,
    pub end: usize,
    pub hue: u32,
    /// Style class for this user's color, see [`CursorStyle`]
    pub class_name: String,
}

impl Decoration {
    /// Map both offsets through `f`.
    pub fn map_offsets(mut self, f: impl Fn(usize) -> usize) -> Self {
        self.start = f(self.start);
        self.end = f(self.end);
        self
    }
}

/// Presentation styles generated for one hue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorStyle {
    pub cursor_class: String,
    pub selection_class: String,
    /// Style sheet rules for both classes
    pub css: String,
}

impl CursorStyle {
    fn for_hue(hue: u32) -> Self {
        let cursor_class = format!("remote-cursor-{}", hue);
        let selection_class = format!("remote-selection-{}", hue);
        let css = format!(
            ".{} {{ border-left: 2px solid hsl({}, 90%, 25%); }}\n\
             .{} {{ background-color: hsla({}, 90%, 80%, 0.5); }}\n",
            cursor_class, hue, selection_class, hue
        );
        Self {
            cursor_class,
            selection_class,
            css,
        }
    }
}

/// Cursor coordinator for one document session.
#[derive(Clone, Debug)]
pub struct CursorCoordinator {
    /// Remote users' cursor data, in codepoints
    remote: BTreeMap<u64, CursorData>,
    /// This client's cursor data, in codepoints
    own: CursorData,
    /// When the own cursor last changed without being sent
    dirty_since: Option<Instant>,
    /// Quiet period before the own cursor is sent
    debounce: Duration,
    /// Styles generated so far, by hue
    styles: HashMap<u32, CursorStyle>,
}

impl CursorCoordinator {
    /// Create a coordinator that waits `debounce` before sending own cursor changes.
    pub fn new(debounce: Duration) -> Self {
        Self {
            remote: BTreeMap::new(),
            own: CursorData::default(),
            dirty_since: None,
            debounce,
            styles: HashMap::new(),
        }
    }

    // ========== Remote cursors ==========

    /// Store the latest cursor data of a remote user.
    pub fn set_remote(&mut self, user_id: u64, data: CursorData) {
        self.remote.insert(user_id, data);
    }

    /// Forget a user who left.
    pub fn remove_user(&mut self, user_id: u64) {
        self.remote.remove(&user_id);
    }

    /// Cursor data of a remote user.
    pub fn remote(&self, user_id: u64) -> Option<&CursorData> {
        self.remote.get(&user_id)
    }

    /// Move every remote cursor and selection through an applied operation.
    ///
    /// Own cursors are not touched: the widget already moved them.
    pub fn transform(&mut self, operation: &OperationSeq) {
        for data in self.remote.values_mut() {
            for cursor in &mut data.cursors {
                *cursor = operation.transform_index(*cursor);
            }
            for (start, end) in &mut data.selections {
                *start = operation.transform_index(*start);
                *end = operation.transform_index(*end);
            }
        }
    }

    /// Decorations for every remote user with both a roster entry and cursor data.
    pub fn decorations(&mut self, users: &BTreeMap<u64, UserInfo>) -> Vec<Decoration> {
        let mut decorations = Vec::new();
        for (&user_id, data) in &self.remote {
            let Some(info) = users.get(&user_id) else {
                continue;
            };
            let style = self
                .styles
                .entry(info.hue)
                .or_insert_with(|| CursorStyle::for_hue(info.hue));
            for &cursor in &data.cursors {
                decorations.push(Decoration {
                    user_id,
                    kind: DecorationKind::Cursor,
                    start: cursor,
                    end: cursor,
                    hue: info.hue,
                    class_name: style.cursor_class.clone(),
                });
            }
            for &(start, end) in &data.selections {
                decorations.push(Decoration {
                    user_id,
                    kind: DecorationKind::Selection,
                    start: start.min(end),
                    end: start.max(end),
                    hue: info.hue,
                    class_name: style.selection_class.clone(),
                });
            }
        }
        decorations
    }

    /// All styles generated so far.
    pub fn styles(&self) -> impl Iterator<Item = &CursorStyle> {
        self.styles.values()
    }

    // ========== Own cursor ==========

    /// This client's latest cursor data.
    pub fn own(&self) -> &CursorData {
        &self.own
    }

    /// Record a change of the own cursor at `now`; sending waits for a quiet period.
    ///
    /// Data equal to the current cursor is not a change.
    pub fn set_own(&mut self, data: CursorData, now: Instant) {
        if data == self.own {
            return;
        }
        self.own = data;
        self.dirty_since = Some(now);
    }

    /// When the pending own cursor change becomes due, if there is one.
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.dirty_since.map(|since| since + self.debounce)
    }

    /// Take the own cursor data if a change has been quiet for the debounce window.
    pub fn take_due(&mut self, now: Instant) -> Option<CursorData> {
        match self.flush_deadline() {
            Some(deadline) if now >= deadline => {
                self.dirty_since = None;
                Some(self.own.clone())
            }
            _ => None,
        }
    }

    /// Mark the own cursor as sent through another path (e.g. on connect).
    pub fn mark_sent(&mut self) {
        self.dirty_since = None;
    }

    /// Drop all remote state and generated styles.
    pub fn dispose(&mut self) {
        self.remote.clear();
        self.styles.clear();
        self.dirty_since = None;
    }
}

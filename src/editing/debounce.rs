use strum::{Display, EnumIter, IntoEnumIterator};

use crate::notes::{Note, NoteId, NotePatch, NoteStore};

/// Editable note fields, each with its own commit timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Title,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceStatus {
    Inactive,
    Idle {
        note_id: NoteId,
        last_committed_at: Option<i64>,
    },
    Pending {
        note_id: NoteId,
        fields: Vec<Field>,
        since: i64,
    },
    Error {
        note_id: NoteId,
        message: String,
        occurred_at: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitEvent {
    Committed {
        note_id: NoteId,
        field: Field,
        timestamp: i64,
    },
    Failed {
        note_id: NoteId,
        field: Field,
        message: String,
    },
}

/// Local echo of the open note's title and content, committed to the store
/// only after a quiet period without further edits to the same field.
#[derive(Debug)]
pub struct EditDebouncer {
    quiet_ms: i64,
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    note_id: NoteId,
    title: String,
    content: String,
    title_timer: Option<PendingCommit>,
    content_timer: Option<PendingCommit>,
    last_committed_at: Option<i64>,
    last_error: Option<CommitFailure>,
}

#[derive(Debug, Clone, Copy)]
struct PendingCommit {
    since: i64,
    deadline: i64,
}

#[derive(Debug, Clone)]
struct CommitFailure {
    message: String,
    occurred_at: i64,
}

impl EditDebouncer {
    pub fn new(quiet_ms: i64) -> Self {
        Self {
            quiet_ms: quiet_ms.max(0),
            session: None,
        }
    }

    pub fn note_id(&self) -> Option<NoteId> {
        self.session.as_ref().map(|s| s.note_id)
    }

    pub fn title(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.title.as_str())
    }

    pub fn content(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.content.as_str())
    }

    pub fn has_pending(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.title_timer.is_some() || s.content_timer.is_some())
            .unwrap_or(false)
    }

    pub fn status(&self) -> DebounceStatus {
        let Some(session) = &self.session else {
            return DebounceStatus::Inactive;
        };
        if let Some(failure) = &session.last_error {
            return DebounceStatus::Error {
                note_id: session.note_id,
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        let pending: Vec<(Field, PendingCommit)> = Field::iter()
            .filter_map(|field| session.timer(field).map(|timer| (field, timer)))
            .collect();
        if let Some(since) = pending.iter().map(|(_, timer)| timer.since).min() {
            return DebounceStatus::Pending {
                note_id: session.note_id,
                fields: pending.into_iter().map(|(field, _)| field).collect(),
                since,
            };
        }
        DebounceStatus::Idle {
            note_id: session.note_id,
            last_committed_at: session.last_committed_at,
        }
    }

    /// Starts editing `note`. Re-opening the note that is already open keeps
    /// the local copy; switching notes discards pending timers and resyncs.
    pub fn open(&mut self, note: &Note) {
        if self.note_id() == Some(note.id) {
            return;
        }
        if let Some(previous) = &self.session {
            if previous.title_timer.is_some() || previous.content_timer.is_some() {
                tracing::debug!(note_id = %previous.note_id, "discarding pending edits on note switch");
            }
        }
        self.session = Some(Session::new(note));
    }

    pub fn close(&mut self) {
        self.session = None;
    }

    pub fn edit_title(&mut self, value: impl Into<String>, now_ms: i64) {
        self.edit(Field::Title, value.into(), now_ms);
    }

    pub fn edit_content(&mut self, value: impl Into<String>, now_ms: i64) {
        self.edit(Field::Content, value.into(), now_ms);
    }

    /// Overwrites the local title outside the keystroke path and drops its
    /// pending commit; the caller has already written the store.
    pub fn replace_title(&mut self, value: impl Into<String>) {
        self.replace(Field::Title, value.into());
    }

    pub fn replace_content(&mut self, value: impl Into<String>) {
        self.replace(Field::Content, value.into());
    }

    /// Commits every field whose quiet period has elapsed.
    pub fn poll(&mut self, store: &mut NoteStore, now_ms: i64) -> Vec<CommitEvent> {
        self.flush_internal(store, now_ms, FlushKind::Debounced)
    }

    /// Commits every pending field regardless of its deadline.
    pub fn flush(&mut self, store: &mut NoteStore, now_ms: i64) -> Vec<CommitEvent> {
        self.flush_internal(store, now_ms, FlushKind::Immediate)
    }

    fn edit(&mut self, field: Field, value: String, now_ms: i64) {
        let quiet_ms = self.quiet_ms;
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(%field, "edit without an open note ignored");
            return;
        };
        let since = session.timer(field).map(|t| t.since).unwrap_or(now_ms);
        *session.local_mut(field) = value;
        *session.timer_mut(field) = Some(PendingCommit {
            since,
            deadline: now_ms.saturating_add(quiet_ms),
        });
        session.last_error = None;
    }

    fn replace(&mut self, field: Field, value: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        *session.local_mut(field) = value;
        *session.timer_mut(field) = None;
    }

    fn flush_internal(
        &mut self,
        store: &mut NoteStore,
        now_ms: i64,
        mode: FlushKind,
    ) -> Vec<CommitEvent> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let mut due: Vec<(Field, i64)> = Field::iter()
            .filter_map(|field| session.timer(field).map(|timer| (field, timer.deadline)))
            .filter(|(_, deadline)| mode == FlushKind::Immediate || *deadline <= now_ms)
            .collect();
        due.sort_by_key(|(_, deadline)| *deadline);

        let mut events = Vec::with_capacity(due.len());
        for (field, _) in due {
            *session.timer_mut(field) = None;
            let value = session.local(field).to_string();
            let unchanged = store
                .get(session.note_id)
                .map(|note| field_value(note, field) == value)
                .unwrap_or(false);
            if unchanged {
                continue;
            }
            let patch = match field {
                Field::Title => NotePatch::title(value),
                Field::Content => NotePatch::content(value),
            }
            .at(now_ms);
            match store.update(session.note_id, patch) {
                Ok(true) => {
                    tracing::debug!(note_id = %session.note_id, %field, "committed debounced edit");
                    session.last_committed_at = Some(now_ms);
                    session.last_error = None;
                    events.push(CommitEvent::Committed {
                        note_id: session.note_id,
                        field,
                        timestamp: now_ms,
                    });
                }
                Ok(false) => {
                    tracing::debug!(note_id = %session.note_id, %field, "note vanished before commit");
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    tracing::warn!(note_id = %session.note_id, %field, %message, "commit failed");
                    session.last_error = Some(CommitFailure {
                        message: message.clone(),
                        occurred_at: now_ms,
                    });
                    events.push(CommitEvent::Failed {
                        note_id: session.note_id,
                        field,
                        message,
                    });
                }
            }
        }
        events
    }
}

impl Session {
    fn new(note: &Note) -> Self {
        Self {
            note_id: note.id,
            title: note.title.clone(),
            content: note.content.clone(),
            title_timer: None,
            content_timer: None,
            last_committed_at: None,
            last_error: None,
        }
    }

    fn local(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Content => &self.content,
        }
    }

    fn local_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Content => &mut self.content,
        }
    }

    fn timer(&self, field: Field) -> Option<PendingCommit> {
        match field {
            Field::Title => self.title_timer,
            Field::Content => self.content_timer,
        }
    }

    fn timer_mut(&mut self, field: Field) -> &mut Option<PendingCommit> {
        match field {
            Field::Title => &mut self.title_timer,
            Field::Content => &mut self.content_timer,
        }
    }
}

fn field_value(note: &Note, field: Field) -> &str {
    match field {
        Field::Title => &note.title,
        Field::Content => &note.content,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FlushKind {
    Debounced,
    Immediate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::init_storage;
    use assert_matches::assert_matches;

    const QUIET: i64 = 500;

    fn setup() -> anyhow::Result<(tempfile::TempDir, NoteStore, Note)> {
        let (temp, storage) = init_storage()?;
        let mut store = NoteStore::load(storage, "mindscribe-notes");
        let note = store.create(0)?;
        Ok((temp, store, note))
    }

    #[test]
    fn rapid_edits_collapse_into_one_commit_with_last_value() -> anyhow::Result<()> {
        let (_temp, mut store, note) = setup()?;
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&note);

        for (i, text) in ["h", "he", "hel", "hell", "hello"].iter().enumerate() {
            let now = 1_000 + i as i64 * 100;
            debouncer.edit_content(*text, now);
            assert_eq!(debouncer.content(), Some(*text));
            assert!(debouncer.poll(&mut store, now).is_empty());
        }
        assert_eq!(store.get(note.id).map(|n| n.content.as_str()), Some(""));

        // last keystroke at 1_400, so nothing before 1_900
        assert!(debouncer.poll(&mut store, 1_899).is_empty());
        let events = debouncer.poll(&mut store, 1_900);
        assert_eq!(events.len(), 1);
        assert_matches!(
            &events[0],
            CommitEvent::Committed { field: Field::Content, timestamp: 1_900, .. }
        );
        let stored = store.get(note.id).expect("note present");
        assert_eq!(stored.content, "hello");
        assert_eq!(stored.updated_at, 1_900);

        assert!(debouncer.poll(&mut store, 5_000).is_empty());
        Ok(())
    }

    #[test]
    fn fields_have_independent_timers() -> anyhow::Result<()> {
        let (_temp, mut store, note) = setup()?;
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&note);

        debouncer.edit_title("Draft", 0);
        debouncer.edit_content("body", 300);

        let events = debouncer.poll(&mut store, 500);
        assert_eq!(events.len(), 1);
        assert_matches!(&events[0], CommitEvent::Committed { field: Field::Title, .. });
        assert_matches!(
            debouncer.status(),
            DebounceStatus::Pending { ref fields, .. } if fields == &vec![Field::Content]
        );

        let events = debouncer.poll(&mut store, 800);
        assert_eq!(events.len(), 1);
        let stored = store.get(note.id).expect("note present");
        assert_eq!(stored.title, "Draft");
        assert_eq!(stored.content, "body");
        Ok(())
    }

    #[test]
    fn switching_notes_discards_pending_and_resyncs() -> anyhow::Result<()> {
        let (_temp, mut store, first) = setup()?;
        let second = store.create(1)?;
        store.update(second.id, NotePatch::content("second body"))?;
        let second = store.get(second.id).cloned().expect("note present");

        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&first);
        debouncer.edit_content("unsaved", 0);

        debouncer.open(&second);
        assert_eq!(debouncer.content(), Some("second body"));
        assert!(!debouncer.has_pending());

        assert!(debouncer.poll(&mut store, 10_000).is_empty());
        assert_eq!(store.get(first.id).map(|n| n.content.as_str()), Some(""));
        Ok(())
    }

    #[test]
    fn reopening_same_note_keeps_local_keystrokes() -> anyhow::Result<()> {
        let (_temp, mut store, note) = setup()?;
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&note);
        debouncer.edit_content("typing", 0);

        store.update(note.id, NotePatch::title("From elsewhere").at(1))?;
        let refreshed = store.get(note.id).cloned().expect("note present");
        debouncer.open(&refreshed);

        assert_eq!(debouncer.content(), Some("typing"));
        assert_eq!(debouncer.title(), Some(""));
        assert!(debouncer.has_pending());
        Ok(())
    }

    #[test]
    fn flush_commits_before_deadline() -> anyhow::Result<()> {
        let (_temp, mut store, note) = setup()?;
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&note);
        debouncer.edit_title("Quick", 10);

        let events = debouncer.flush(&mut store, 20);
        assert_eq!(events.len(), 1);
        assert_eq!(store.get(note.id).map(|n| n.updated_at), Some(20));
        assert_matches!(
            debouncer.status(),
            DebounceStatus::Idle { last_committed_at: Some(20), .. }
        );
        Ok(())
    }

    #[test]
    fn unchanged_value_does_not_touch_timestamp() -> anyhow::Result<()> {
        let (_temp, mut store, note) = setup()?;
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&note);
        debouncer.edit_content("x", 0);
        debouncer.edit_content("", 100);

        assert!(debouncer.poll(&mut store, 1_000).is_empty());
        assert_eq!(store.get(note.id).map(|n| n.updated_at), Some(0));
        Ok(())
    }

    #[test]
    fn replace_cancels_pending_commit_for_that_field() -> anyhow::Result<()> {
        let (_temp, mut store, note) = setup()?;
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&note);
        debouncer.edit_content("typed", 0);
        debouncer.edit_title("typed title", 0);

        store.update(note.id, NotePatch::content("from ai").at(100))?;
        debouncer.replace_content("from ai");

        let events = debouncer.poll(&mut store, 1_000);
        assert_eq!(events.len(), 1);
        assert_matches!(&events[0], CommitEvent::Committed { field: Field::Title, .. });
        let stored = store.get(note.id).expect("note present");
        assert_eq!(stored.content, "from ai");
        assert_eq!(stored.title, "typed title");
        Ok(())
    }

    #[test]
    fn edits_without_session_are_ignored() {
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.edit_content("lost", 0);
        assert_eq!(debouncer.content(), None);
        assert_eq!(debouncer.status(), DebounceStatus::Inactive);
    }

    #[test]
    fn deleted_note_drops_pending_commit() -> anyhow::Result<()> {
        let (_temp, mut store, note) = setup()?;
        let mut debouncer = EditDebouncer::new(QUIET);
        debouncer.open(&note);
        debouncer.edit_content("orphan", 0);
        store.delete(note.id)?;

        assert!(debouncer.poll(&mut store, 1_000).is_empty());
        assert!(!debouncer.has_pending());
        Ok(())
    }
}

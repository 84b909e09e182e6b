use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ai::coordinator::CoordinatorSettings;
use crate::ai::{AiAction, AiCoordinator, AiEvent, AiGateway, RequestOutcome, SessionAiState};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::editing::{CommitEvent, DebounceStatus, EditDebouncer};
use crate::notes::{Note, NoteId, NoteStore};
use crate::storage::StorageHandle;

pub mod state;

pub use state::Selection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    Commit(CommitEvent),
    Ai(AiEvent),
}

/// Owns the note collection and everything that mutates it: the selection,
/// the debounced editing session and the AI coordinator for the open note.
pub struct Workspace {
    store: NoteStore,
    selection: Selection,
    debouncer: EditDebouncer,
    ai: AiCoordinator,
    clock: Arc<dyn Clock>,
}

impl Workspace {
    pub fn open(
        config: &AppConfig,
        storage: StorageHandle,
        gateway: Arc<dyn AiGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = NoteStore::load(storage, config.storage.slot_key.clone());
        Self::new(store, config, gateway, clock)
    }

    pub fn new(
        store: NoteStore,
        config: &AppConfig,
        gateway: Arc<dyn AiGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = CoordinatorSettings {
            status_reset_ms: config.ai.status_reset_ms(),
            title_prefix_chars: config.ai.title_prefix_chars,
        };
        let mut workspace = Self {
            store,
            selection: Selection::default(),
            debouncer: EditDebouncer::new(config.editor.debounce_ms()),
            ai: AiCoordinator::new(gateway, settings),
            clock,
        };
        if let Some(first) = workspace.store.all().first().map(|note| note.id) {
            workspace.select_note(first);
        }
        workspace
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn visible_notes(&self) -> Vec<&Note> {
        self.selection.visible_notes(&self.store)
    }

    pub fn query(&self) -> &str {
        self.selection.query()
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.selection.set_query(query);
    }

    pub fn selected_id(&self) -> Option<NoteId> {
        self.selection.selected()
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.selected_id().and_then(|id| self.store.get(id))
    }

    pub fn local_title(&self) -> Option<&str> {
        self.debouncer.title()
    }

    pub fn local_content(&self) -> Option<&str> {
        self.debouncer.content()
    }

    pub fn ai_state(&self) -> &SessionAiState {
        self.ai.state()
    }

    pub fn debounce_status(&self) -> DebounceStatus {
        self.debouncer.status()
    }

    /// Creates an empty note at the top of the list and opens it.
    pub fn create_note(&mut self) -> Result<Note> {
        let note = self
            .store
            .create(self.clock.now_ms())
            .context("creating note")?;
        self.selection.on_created(note.id);
        self.sync_session();
        Ok(note)
    }

    /// Opens `id`; unknown ids leave the selection untouched.
    pub fn select_note(&mut self, id: NoteId) -> bool {
        if !self.store.contains(id) {
            tracing::debug!(note_id = %id, "select of unknown note ignored");
            return false;
        }
        self.selection.select(Some(id));
        self.sync_session();
        true
    }

    pub fn close_note(&mut self) {
        self.selection.select(None);
        self.sync_session();
    }

    /// A failed write leaves both the store and the selection as they were.
    pub fn delete_note(&mut self, id: NoteId) -> Result<bool> {
        let removed = self
            .store
            .delete(id)
            .with_context(|| format!("deleting note {id}"))?;
        if self.selection.on_deleted(id, &self.store) {
            self.sync_session();
        }
        Ok(removed)
    }

    pub fn edit_title(&mut self, value: impl Into<String>) {
        let now = self.clock.now_ms();
        self.debouncer.edit_title(value, now);
    }

    pub fn edit_content(&mut self, value: impl Into<String>) {
        let now = self.clock.now_ms();
        self.debouncer.edit_content(value, now);
    }

    /// Starts `action` against the open note's local content.
    pub fn run_ai(&mut self, action: AiAction) -> RequestOutcome {
        let (Some(note_id), Some(content)) = (self.debouncer.note_id(), self.debouncer.content())
        else {
            return RequestOutcome::Skipped;
        };
        let now = self.clock.now_ms();
        self.ai.request(action, note_id, content, now)
    }

    pub fn is_ai_loading(&self) -> bool {
        self.ai.is_loading()
    }

    /// Fires due debounce commits, then applies finished AI requests.
    pub fn tick(&mut self) -> Vec<WorkspaceEvent> {
        let now = self.clock.now_ms();
        let mut events: Vec<WorkspaceEvent> = self
            .debouncer
            .poll(&mut self.store, now)
            .into_iter()
            .map(WorkspaceEvent::Commit)
            .collect();
        events.extend(
            self.ai
                .poll(&mut self.store, &mut self.debouncer, now)
                .into_iter()
                .map(WorkspaceEvent::Ai),
        );
        events
    }

    pub fn wait_for_ai(&mut self, timeout: Duration) -> Vec<WorkspaceEvent> {
        self.ai
            .wait(
                &mut self.store,
                &mut self.debouncer,
                self.clock.as_ref(),
                timeout,
            )
            .into_iter()
            .map(WorkspaceEvent::Ai)
            .collect()
    }

    /// Commits pending edits immediately.
    pub fn flush(&mut self) -> Vec<CommitEvent> {
        let now = self.clock.now_ms();
        self.debouncer.flush(&mut self.store, now)
    }

    fn sync_session(&mut self) {
        let selected = self.selection.selected();
        match selected.and_then(|id| self.store.get(id)) {
            Some(note) => self.debouncer.open(note),
            None => self.debouncer.close(),
        }
        self.ai.open_session(selected);
    }
}

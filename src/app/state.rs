use crate::notes::{Note, NoteId, NoteStore};
use crate::search::NoteFilter;

/// Which note is open and what the list is filtered by.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    selected: Option<NoteId>,
    query: String,
    filter: NoteFilter,
}

impl Selection {
    pub fn selected(&self) -> Option<NoteId> {
        self.selected
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn select(&mut self, id: Option<NoteId>) {
        self.selected = id;
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.filter = NoteFilter::new(&self.query);
    }

    pub fn visible_notes<'a>(&self, store: &'a NoteStore) -> Vec<&'a Note> {
        self.filter.apply(store.all())
    }

    /// Newly created notes are always opened.
    pub fn on_created(&mut self, id: NoteId) {
        self.selected = Some(id);
    }

    /// Called after `id` left the store. Returns whether the selection moved.
    pub fn on_deleted(&mut self, id: NoteId, store: &NoteStore) -> bool {
        if self.selected != Some(id) {
            return false;
        }
        self.selected = store.all().first().map(|note| note.id);
        true
    }
}

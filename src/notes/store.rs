use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::notes::model::{Note, NoteId, NotePatch};
use crate::storage::StorageHandle;

/// Canonical, ordered note collection. Newest creations sit at the front and
/// every mutation rewrites the whole collection into its storage slot.
pub struct NoteStore {
    storage: StorageHandle,
    slot_key: String,
    notes: Vec<Note>,
}

impl NoteStore {
    /// Reads the collection once. A missing, unreadable or undecodable slot
    /// yields an empty store rather than an error.
    pub fn load(storage: StorageHandle, slot_key: impl Into<String>) -> Self {
        let slot_key = slot_key.into();
        let notes = match storage.read_slot(&slot_key) {
            Ok(Some(raw)) => decode_snapshot(&raw, &slot_key),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(?err, slot = %slot_key, "note snapshot unreadable, starting empty");
                Vec::new()
            }
        };
        tracing::info!(count = notes.len(), slot = %slot_key, "loaded notes");
        Self {
            storage,
            slot_key,
            notes,
        }
    }

    pub fn all(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn create(&mut self, now_ms: i64) -> Result<Note> {
        let mut note = Note::new(now_ms);
        while self.contains(note.id) {
            note.id = NoteId::generate();
        }
        self.notes.insert(0, note.clone());
        if let Err(err) = self.persist() {
            self.notes.remove(0);
            return Err(err.context("persisting new note"));
        }
        tracing::debug!(note_id = %note.id, "created note");
        Ok(note)
    }

    /// Merges `patch` into the note with `id`. Returns `false` without
    /// touching storage when no such note exists. Timestamps are taken from
    /// the patch only.
    pub fn update(&mut self, id: NoteId, patch: NotePatch) -> Result<bool> {
        let Some(note) = self.notes.iter_mut().find(|note| note.id == id) else {
            tracing::debug!(note_id = %id, "update for unknown note ignored");
            return Ok(false);
        };
        if patch.is_empty() || !note.apply(patch) {
            return Ok(true);
        }
        self.persist()
            .with_context(|| format!("persisting update to note {id}"))?;
        Ok(true)
    }

    /// Removes the note with `id`; absent ids are a no-op. Create and delete
    /// only change memory once the slot write succeeded.
    pub fn delete(&mut self, id: NoteId) -> Result<bool> {
        let Some(position) = self.notes.iter().position(|note| note.id == id) else {
            return Ok(false);
        };
        let removed = self.notes.remove(position);
        if let Err(err) = self.persist() {
            self.notes.insert(position, removed);
            return Err(err.context(format!("persisting deletion of note {id}")));
        }
        tracing::debug!(note_id = %id, "deleted note");
        Ok(true)
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.notes).context("serialising note collection")?;
        self.storage.write_slot(&self.slot_key, &json)
    }
}

fn decode_snapshot(raw: &str, slot_key: &str) -> Vec<Note> {
    let notes: Vec<Note> = match serde_json::from_str(raw) {
        Ok(notes) => notes,
        Err(err) => {
            tracing::warn!(?err, slot = %slot_key, "note snapshot corrupt, starting empty");
            return Vec::new();
        }
    };
    let mut seen = HashSet::with_capacity(notes.len());
    notes
        .into_iter()
        .filter(|note| {
            let fresh = seen.insert(note.id);
            if !fresh {
                tracing::warn!(note_id = %note.id, "dropping duplicate note id from snapshot");
            }
            fresh
        })
        .collect()
}

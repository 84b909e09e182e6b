pub mod model;
pub mod store;

pub use model::{Note, NoteId, NotePatch, UNTITLED_NOTE};
pub use store::NoteStore;

pub mod debounce;

pub use debounce::{CommitEvent, DebounceStatus, EditDebouncer, Field};

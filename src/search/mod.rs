use crate::notes::Note;

/// Case-insensitive substring filter over note titles and contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    needle: String,
}

impl NoteFilter {
    pub fn new(query: &str) -> Self {
        Self {
            needle: query.to_lowercase(),
        }
    }

    /// An empty query matches everything.
    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    pub fn matches(&self, note: &Note) -> bool {
        if self.is_empty() {
            return true;
        }
        note.title.to_lowercase().contains(&self.needle)
            || note.content.to_lowercase().contains(&self.needle)
    }

    /// Keeps matching notes in their original relative order.
    pub fn apply<'a>(&self, notes: &'a [Note]) -> Vec<&'a Note> {
        notes.iter().filter(|note| self.matches(note)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(title: &str, content: &str) -> Note {
        let mut note = Note::new(0);
        note.title = title.into();
        note.content = content.into();
        note
    }

    #[test]
    fn matches_titles_case_insensitively() {
        let hello = note("Hello World", "");
        for query in ["hello", "WORLD", "lo wo"] {
            assert!(NoteFilter::new(query).matches(&hello), "query {query:?}");
        }
        assert!(!NoteFilter::new("xyz").matches(&hello));
    }

    #[test]
    fn matches_content_as_well_as_title() {
        let body = note("", "Remember the Milk");
        assert!(NoteFilter::new("the milk").matches(&body));
    }

    #[test]
    fn query_is_not_tokenized() {
        let n = note("alpha beta", "");
        assert!(!NoteFilter::new("beta alpha").matches(&n));
    }

    #[test]
    fn empty_query_keeps_everything_in_order() {
        let notes = vec![note("b", ""), note("a", ""), note("c", "")];
        let filter = NoteFilter::new("");
        assert!(filter.is_empty());
        let titles: Vec<_> = filter.apply(&notes).iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
    }

    #[test]
    fn filtered_results_preserve_relative_order() {
        let notes = vec![
            note("Plan trip", ""),
            note("Other", ""),
            note("Trip budget", ""),
        ];
        let titles: Vec<_> = NoteFilter::new("trip")
            .apply(&notes)
            .iter()
            .map(|n| n.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Plan trip", "Trip budget"]);
    }
}

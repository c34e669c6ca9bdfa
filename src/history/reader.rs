//! Reading run history back

use super::record::{HistoryNote, RunRecord};
use crate::error::ValnotesResult;
use crate::fingerprint::TreeHash;
use crate::notes::{Category, NoteLookup, NotesLog};
use serde::Serialize;
use tracing::warn;

/// Whether a tree has produced inconsistent results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlakinessReport {
    /// Both passing and failing runs exist for the same content
    pub flaky: bool,
    pub passed: usize,
    pub failed: usize,
}

/// Last run appended, which is the authoritative result for the tree
pub fn most_recent(note: &HistoryNote) -> Option<&RunRecord> {
    note.most_recent()
}

/// Count passing and failing runs of one tree
pub fn detect_flakiness(note: &HistoryNote) -> FlakinessReport {
    let passed = note.runs.iter().filter(|r| r.passed).count();
    let failed = note.runs.len() - passed;
    FlakinessReport {
        flaky: passed > 0 && failed > 0,
        passed,
        failed,
    }
}

/// Read-side access to one history category
pub struct HistoryReader {
    log: NotesLog,
    category: Category,
}

impl HistoryReader {
    pub fn new(log: NotesLog, category: Category) -> Self {
        Self { log, category }
    }

    /// Look up the note for `tree`, distinguishing missing from unreadable
    pub async fn lookup(&self, tree: &TreeHash) -> ValnotesResult<NoteLookup> {
        self.log.read(&self.category, tree).await
    }

    /// The note for `tree`, or `None` when absent or unreadable
    pub async fn read(&self, tree: &TreeHash) -> ValnotesResult<Option<HistoryNote>> {
        match self.lookup(tree).await? {
            NoteLookup::Found(note) => Ok(Some(note)),
            NoteLookup::Missing => Ok(None),
            NoteLookup::Unreadable(reason) => {
                warn!(
                    "Ignoring unreadable history note for {}: {}",
                    tree.short(),
                    reason
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::testing::{note_body, run_at, tree};
    use crate::notes::memory::MemoryNotes;
    use crate::notes::RetryPolicy;
    use chrono::Utc;
    use std::sync::Arc;

    fn note(results: &[bool]) -> HistoryNote {
        let mut note = HistoryNote::new(tree(1));
        note.runs = results.iter().map(|&p| run_at(p, Utc::now())).collect();
        note
    }

    #[test]
    fn pass_fail_pass_is_flaky_and_passing() {
        let note = note(&[true, false, true]);

        assert!(most_recent(&note).unwrap().passed);
        assert_eq!(
            detect_flakiness(&note),
            FlakinessReport {
                flaky: true,
                passed: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn consistent_results_are_not_flaky() {
        assert!(!detect_flakiness(&note(&[false, false])).flaky);
        assert!(!detect_flakiness(&note(&[])).flaky);
        assert!(most_recent(&note(&[])).is_none());
    }

    #[tokio::test]
    async fn read_hides_unreadable_note_but_lookup_reports_it() {
        let backend = Arc::new(MemoryNotes::new());
        let category = Category::validation();
        backend.seed(&category.notes_ref(), &tree(3), "[]");
        backend.seed(
            &category.notes_ref(),
            &tree(4),
            &note_body(&tree(4), vec![run_at(true, Utc::now())]),
        );
        let reader = HistoryReader::new(
            NotesLog::new(backend, RetryPolicy::default()),
            category,
        );

        assert!(reader.read(&tree(3)).await.unwrap().is_none());
        assert!(matches!(
            reader.lookup(&tree(3)).await.unwrap(),
            NoteLookup::Unreadable(_)
        ));
        assert_eq!(reader.read(&tree(4)).await.unwrap().unwrap().runs.len(), 1);
        assert!(reader.read(&tree(5)).await.unwrap().is_none());
    }
}

//! In-memory notes backend for tests
//!
//! Mirrors git's object model closely enough to exercise the append loop:
//! refs point at commits, commits map tree hashes to blobs. Writers racing
//! the loop are simulated by queueing intrusions that land just before the
//! next publish.

use super::{NoteEntry, NotesBackend, Publish};
use crate::error::{ValnotesError, ValnotesResult};
use crate::fingerprint::TreeHash;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    refs: HashMap<String, String>,
    commits: HashMap<String, BTreeMap<TreeHash, String>>,
    blobs: HashMap<String, String>,
    next_oid: u64,
    intrusions: HashMap<String, VecDeque<(TreeHash, Option<String>)>>,
    reject_all: bool,
    contend_all: bool,
    fail_commits: HashSet<TreeHash>,
    publish_calls: u32,
}

impl State {
    fn oid(&mut self) -> String {
        self.next_oid += 1;
        format!("{:040x}", self.next_oid)
    }

    fn build(&mut self, parent: Option<&str>, object: &TreeHash, body: Option<&str>) -> String {
        let mut notes = parent
            .and_then(|p| self.commits.get(p).cloned())
            .unwrap_or_default();
        match body {
            Some(body) => {
                let blob = self.oid();
                self.blobs.insert(blob.clone(), body.to_string());
                notes.insert(object.clone(), blob);
            }
            None => {
                notes.remove(object);
            }
        }
        let commit = self.oid();
        self.commits.insert(commit.clone(), notes);
        commit
    }

    fn entry(&self, tip: &str, object: &TreeHash) -> Option<NoteEntry> {
        let blob = self.commits.get(tip)?.get(object)?;
        Some(NoteEntry {
            tree_hash: object.clone(),
            blob: blob.clone(),
            size_bytes: self.blobs.get(blob).map_or(0, |b| b.len() as u64),
        })
    }
}

#[derive(Default)]
pub(crate) struct MemoryNotes {
    state: Mutex<State>,
}

impl MemoryNotes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Write a note directly, bypassing the append loop
    pub(crate) fn seed(&self, notes_ref: &str, object: &TreeHash, body: &str) {
        let mut state = self.state.lock().unwrap();
        let tip = state.refs.get(notes_ref).cloned();
        let commit = state.build(tip.as_deref(), object, Some(body));
        state.refs.insert(notes_ref.to_string(), commit);
    }

    /// Current note body, if any
    pub(crate) fn body(&self, notes_ref: &str, object: &TreeHash) -> Option<String> {
        let state = self.state.lock().unwrap();
        let tip = state.refs.get(notes_ref)?;
        let entry = state.entry(tip, object)?;
        state.blobs.get(&entry.blob).cloned()
    }

    /// Have another writer set (or remove, with `None`) a note just before
    /// the next publish to `notes_ref`, so that publish is rejected
    pub(crate) fn intrude_before_publish(
        &self,
        notes_ref: &str,
        object: &TreeHash,
        body: Option<&str>,
    ) {
        let mut state = self.state.lock().unwrap();
        state
            .intrusions
            .entry(notes_ref.to_string())
            .or_default()
            .push_back((object.clone(), body.map(str::to_string)));
    }

    /// Reject every publish as if the ref always moved
    pub(crate) fn reject_all(&self) {
        self.state.lock().unwrap().reject_all = true;
    }

    /// Fail every publish as if the ref were locked
    pub(crate) fn contend_all(&self) {
        self.state.lock().unwrap().contend_all = true;
    }

    /// Make building commits for `object` fail
    pub(crate) fn fail_commits_for(&self, object: &TreeHash) {
        self.state.lock().unwrap().fail_commits.insert(object.clone());
    }

    pub(crate) fn publish_calls(&self) -> u32 {
        self.state.lock().unwrap().publish_calls
    }
}

#[async_trait]
impl NotesBackend for MemoryNotes {
    async fn tip(&self, notes_ref: &str) -> ValnotesResult<Option<String>> {
        Ok(self.state.lock().unwrap().refs.get(notes_ref).cloned())
    }

    async fn entries(&self, tip: &str) -> ValnotesResult<Vec<NoteEntry>> {
        let state = self.state.lock().unwrap();
        let Some(notes) = state.commits.get(tip) else {
            return Ok(Vec::new());
        };
        Ok(notes
            .keys()
            .filter_map(|object| state.entry(tip, object))
            .collect())
    }

    async fn entry(&self, tip: &str, object: &TreeHash) -> ValnotesResult<Option<NoteEntry>> {
        Ok(self.state.lock().unwrap().entry(tip, object))
    }

    async fn read_blob(&self, blob: &str) -> ValnotesResult<String> {
        self.state
            .lock()
            .unwrap()
            .blobs
            .get(blob)
            .cloned()
            .ok_or_else(|| ValnotesError::git("cat-file", format!("missing blob {}", blob)))
    }

    async fn commit(
        &self,
        parent: Option<&str>,
        object: &TreeHash,
        body: Option<&str>,
    ) -> ValnotesResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commits.contains(object) {
            return Err(ValnotesError::git("notes add", "simulated failure"));
        }
        Ok(state.build(parent, object, body))
    }

    async fn publish(
        &self,
        notes_ref: &str,
        expected: Option<&str>,
        new: &str,
    ) -> ValnotesResult<Publish> {
        let mut state = self.state.lock().unwrap();
        state.publish_calls += 1;

        let intrusion = state
            .intrusions
            .get_mut(notes_ref)
            .and_then(VecDeque::pop_front);
        if let Some((object, body)) = intrusion {
            let tip = state.refs.get(notes_ref).cloned();
            let foreign = state.build(tip.as_deref(), &object, body.as_deref());
            state.refs.insert(notes_ref.to_string(), foreign);
        }

        if state.contend_all {
            return Ok(Publish::Contended {
                detail: "cannot lock ref".to_string(),
            });
        }

        let current = state.refs.get(notes_ref).cloned();
        if state.reject_all || current.as_deref() != expected {
            return Ok(Publish::Rejected { current });
        }

        state.refs.insert(notes_ref.to_string(), new.to_string());
        Ok(Publish::Updated)
    }
}

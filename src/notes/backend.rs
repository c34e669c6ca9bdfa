//! Notes storage backends
//!
//! [`NotesBackend`] exposes the object-level primitives the append loop is
//! built from. The git implementation shells out to `git`; tests use an
//! in-memory implementation that can simulate racing writers.

use super::{NoteEntry, SCRATCH_REF_PREFIX};
use crate::error::{ValnotesError, ValnotesResult};
use crate::fingerprint::TreeHash;
use crate::git::GitRepo;
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

/// Ref writes keep no reflog, so pruned notes become unreachable right away
const NO_REFLOG: [&str; 2] = ["-c", "core.logAllRefUpdates=false"];

/// Identity used for notes commits; the notes ref history is tool metadata
const NOTES_AUTHOR: [&str; 4] = [
    "-c",
    "user.name=valnotes",
    "-c",
    "user.email=valnotes@localhost",
];

/// Result of a compare-and-swap publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publish {
    /// The ref now points at the new commit
    Updated,
    /// Another writer moved the ref first
    Rejected { current: Option<String> },
    /// The ref did not move but could not be updated (typically locked by a
    /// concurrent writer)
    Contended { detail: String },
}

/// Object-level access to a notes store
#[async_trait]
pub trait NotesBackend: Send + Sync {
    /// Commit the notes ref points at, `None` if it does not exist yet
    async fn tip(&self, notes_ref: &str) -> ValnotesResult<Option<String>>;

    /// Every note reachable from a notes commit
    async fn entries(&self, tip: &str) -> ValnotesResult<Vec<NoteEntry>>;

    /// The note attached to `object` at a notes commit
    async fn entry(&self, tip: &str, object: &TreeHash) -> ValnotesResult<Option<NoteEntry>>;

    /// Contents of a note blob
    async fn read_blob(&self, blob: &str) -> ValnotesResult<String>;

    /// Build an unpublished notes commit on top of `parent` that sets the
    /// note for `object` to `body`, or removes it when `body` is `None`
    async fn commit(
        &self,
        parent: Option<&str>,
        object: &TreeHash,
        body: Option<&str>,
    ) -> ValnotesResult<String>;

    /// Move `notes_ref` to `new` only if it still points at `expected`
    async fn publish(
        &self,
        notes_ref: &str,
        expected: Option<&str>,
        new: &str,
    ) -> ValnotesResult<Publish>;
}

/// Notes backend backed by the repository's git notes
pub struct GitNotesBackend {
    repo: GitRepo,
}

impl GitNotesBackend {
    pub fn new(repo: GitRepo) -> Self {
        Self { repo }
    }

    /// Paths a note for `object` may live at, for each notes fanout depth
    fn fanout_paths(object: &TreeHash) -> Vec<String> {
        let hex = object.as_str();
        (0..=3)
            .map(|depth| {
                let mut path = String::with_capacity(hex.len() + depth);
                for level in 0..depth {
                    path.push_str(&hex[level * 2..level * 2 + 2]);
                    path.push('/');
                }
                path.push_str(&hex[depth * 2..]);
                path
            })
            .collect()
    }

    /// Parse `git ls-tree -l` output into note entries
    fn parse_ls_tree(output: &str) -> Vec<NoteEntry> {
        output
            .lines()
            .filter_map(|line| {
                let (meta, path) = line.split_once('\t')?;
                let mut fields = meta.split_whitespace();
                let _mode = fields.next()?;
                if fields.next()? != "blob" {
                    return None;
                }
                let blob = fields.next()?.to_string();
                let size_bytes = fields.next()?.parse().ok()?;
                // Fanout directories are part of the annotated object's id
                let tree_hash = TreeHash::parse(&path.replace('/', "")).ok()?;
                Some(NoteEntry {
                    tree_hash,
                    blob,
                    size_bytes,
                })
            })
            .collect()
    }

    async fn commit_on(
        &self,
        scratch: &str,
        object: &TreeHash,
        body: Option<&str>,
    ) -> ValnotesResult<String> {
        let mut args: Vec<&str> = NO_REFLOG.to_vec();
        args.extend(NOTES_AUTHOR);
        args.extend(["notes", "--ref", scratch]);

        match body {
            Some(body) => {
                args.extend(["add", "--force", "--file", "-", object.as_str()]);
                self.repo.run_with(&args, &[], Some(body.as_bytes())).await?;
            }
            None => {
                args.extend(["remove", "--ignore-missing", object.as_str()]);
                self.repo.run(&args).await?;
            }
        }

        self.repo.run(&["rev-parse", "--verify", scratch]).await
    }
}

#[async_trait]
impl NotesBackend for GitNotesBackend {
    async fn tip(&self, notes_ref: &str) -> ValnotesResult<Option<String>> {
        let listing = self
            .repo
            .run(&["for-each-ref", "--format=%(refname) %(objectname)", notes_ref])
            .await?;

        Ok(listing.lines().find_map(|line| {
            let (name, oid) = line.split_once(' ')?;
            (name == notes_ref).then(|| oid.to_string())
        }))
    }

    async fn entries(&self, tip: &str) -> ValnotesResult<Vec<NoteEntry>> {
        let listing = self.repo.run(&["ls-tree", "-r", "-l", tip]).await?;
        Ok(Self::parse_ls_tree(&listing))
    }

    async fn entry(&self, tip: &str, object: &TreeHash) -> ValnotesResult<Option<NoteEntry>> {
        let paths = Self::fanout_paths(object);
        let mut args = vec!["ls-tree", "-l", tip, "--"];
        args.extend(paths.iter().map(String::as_str));

        let listing = self.repo.run(&args).await?;
        Ok(Self::parse_ls_tree(&listing)
            .into_iter()
            .find(|entry| &entry.tree_hash == object))
    }

    async fn read_blob(&self, blob: &str) -> ValnotesResult<String> {
        let output = self.repo.exec(&["cat-file", "blob", blob]).await?;
        if !output.status.success() {
            return Err(ValnotesError::git(
                format!("git cat-file blob {}", blob),
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn commit(
        &self,
        parent: Option<&str>,
        object: &TreeHash,
        body: Option<&str>,
    ) -> ValnotesResult<String> {
        let scratch = format!("{}{}", SCRATCH_REF_PREFIX, Uuid::new_v4().simple());

        if let Some(parent) = parent {
            let mut args: Vec<&str> = NO_REFLOG.to_vec();
            args.extend(["update-ref", scratch.as_str(), parent]);
            self.repo.run(&args).await?;
        }

        let result = self.commit_on(&scratch, object, body).await;

        if let Err(e) = self.repo.run(&["update-ref", "-d", &scratch]).await {
            debug!("Could not delete scratch ref {}: {}", scratch, e);
        }

        result
    }

    async fn publish(
        &self,
        notes_ref: &str,
        expected: Option<&str>,
        new: &str,
    ) -> ValnotesResult<Publish> {
        // An all-zero old value means "must not exist yet"
        let absent = "0".repeat(new.len());
        let old = expected.unwrap_or(&absent);

        let mut args: Vec<&str> = NO_REFLOG.to_vec();
        args.extend(["update-ref", notes_ref, new, old]);
        let output = self.repo.exec(&args).await?;

        if output.status.success() {
            return Ok(Publish::Updated);
        }

        // Decide from the ref's actual state, not from git's wording
        let current = self.tip(notes_ref).await?;
        if current.as_deref() != expected {
            Ok(Publish::Rejected { current })
        } else {
            Ok(Publish::Contended {
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

//! Git command execution
//!
//! Every repository interaction shells out to the `git` binary so the user's
//! own ignore rules, object format and hook environment apply unchanged.

use crate::error::{ValnotesError, ValnotesResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A discovered git working tree
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    git_dir: PathBuf,
}

impl GitRepo {
    /// Locate the working tree containing `dir`
    ///
    /// Returns [`ValnotesError::NotARepository`] outside a working tree
    /// (including bare repositories) and [`ValnotesError::GitNotFound`] when
    /// git is not installed.
    pub async fn discover(dir: &Path) -> ValnotesResult<Self> {
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["rev-parse", "--show-toplevel", "--absolute-git-dir"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ValnotesError::command_failed("git rev-parse", e))?;

        if !output.status.success() {
            return Err(ValnotesError::NotARepository(dir.to_path_buf()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        match (lines.next(), lines.next()) {
            (Some(root), Some(git_dir)) => {
                debug!("Discovered git working tree at {}", root);
                Ok(Self {
                    root: PathBuf::from(root),
                    git_dir: PathBuf::from(git_dir),
                })
            }
            _ => Err(ValnotesError::GitOutput {
                command: "git rev-parse --show-toplevel --absolute-git-dir".to_string(),
                output: stdout.to_string(),
            }),
        }
    }

    /// Top-level directory of the working tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the repository's git directory
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Execute a git command in the working tree root and return its output
    pub async fn exec(&self, args: &[&str]) -> ValnotesResult<Output> {
        self.exec_with(args, &[], None).await
    }

    /// Execute a git command with extra environment and optional stdin
    pub async fn exec_with(
        &self,
        args: &[&str],
        envs: &[(&str, &OsStr)],
        stdin: Option<&[u8]>,
    ) -> ValnotesResult<Output> {
        debug!("Executing: git {:?}", args);

        let mut cmd = Command::new("git");
        cmd.current_dir(&self.root)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let describe = || format!("git {}", args.join(" "));

        let Some(input) = stdin else {
            return cmd
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| ValnotesError::command_failed(describe(), e));
        };

        let mut child = cmd
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| ValnotesError::command_failed(describe(), e))?;

        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input)
                .await
                .map_err(|e| ValnotesError::io(format!("writing stdin of {}", describe()), e))?;
            // Dropping the handle closes stdin so git sees EOF
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| ValnotesError::command_failed(describe(), e))
    }

    /// Execute a git command that must succeed, returning trimmed stdout
    pub async fn run(&self, args: &[&str]) -> ValnotesResult<String> {
        let output = self.exec(args).await?;
        Self::checked(args, output)
    }

    /// Like [`GitRepo::run`] with extra environment and optional stdin
    pub async fn run_with(
        &self,
        args: &[&str],
        envs: &[(&str, &OsStr)],
        stdin: Option<&[u8]>,
    ) -> ValnotesResult<String> {
        let output = self.exec_with(args, envs, stdin).await?;
        Self::checked(args, output)
    }

    fn checked(args: &[&str], output: Output) -> ValnotesResult<String> {
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(ValnotesError::git(
                format!("git {}", args.join(" ")),
                String::from_utf8_lossy(&output.stderr),
            ))
        }
    }

    /// Resolve a path inside the git directory, honouring `GIT_INDEX_FILE`
    /// and other relocation variables
    pub async fn git_path(&self, name: &str) -> ValnotesResult<PathBuf> {
        let path = PathBuf::from(self.run(&["rev-parse", "--git-path", name]).await?);
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.root.join(path))
        }
    }

    /// Short name of the checked-out branch, `None` when HEAD is detached
    pub async fn current_branch(&self) -> ValnotesResult<Option<String>> {
        let output = self.exec(&["symbolic-ref", "--quiet", "--short", "HEAD"]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Commit HEAD points at, `None` in a repository without commits
    pub async fn head_commit(&self) -> ValnotesResult<Option<String>> {
        let output = self
            .exec(&["rev-parse", "--verify", "--quiet", "HEAD^{commit}"])
            .await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Whether the working tree differs from HEAD (untracked files included)
    pub async fn has_uncommitted_changes(&self) -> ValnotesResult<bool> {
        let status = self
            .run(&["status", "--porcelain", "--untracked-files=normal"])
            .await?;
        Ok(!status.is_empty())
    }
}

//! Stash: save and restore uncommitted work as synthetic commits.
//!
//! A stash entry is a commit with two or three parents: the commit HEAD
//! pointed to when the stash was made, a synthetic commit whose tree is the
//! index at that time, and optionally a third orphan commit holding
//! untracked files. `refs/stash` always points at the newest entry; older
//! entries are addressed purely through that ref's reflog (`stash@{N}`,
//! N=0 being the current value) — there is no separate stash list object.
//!
//! This module does not walk the working tree itself: callers supply the
//! tree OIDs for the working-tree snapshot, the index, and (optionally)
//! untracked files, since producing those trees requires a filesystem
//! adapter this crate doesn't own.

use bstr::BString;
use git_hash::ObjectId;
use git_object::{Commit, Object};
use git_ref::{reflog, RefName, RefStore};
use git_utils::date::{GitDate, Signature};

use crate::{RepoError, Repository};

const STASH_REF: &str = "refs/stash";

/// One entry in the stash list.
#[derive(Debug, Clone)]
pub struct StashEntry {
    /// Position in the reflog; 0 is the most recently pushed entry.
    pub index: usize,
    /// OID of the stash commit.
    pub oid: ObjectId,
    /// The reflog message recorded when this entry was pushed.
    pub message: BString,
}

/// List all stash entries, newest first.
pub fn list(repo: &Repository) -> Result<Vec<StashEntry>, RepoError> {
    let stash_ref = RefName::new(STASH_REF)?;
    let entries = repo.refs().reflog(&stash_ref)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, e)| StashEntry {
            index,
            oid: e.new_oid,
            message: e.message,
        })
        .collect())
}

/// Save the working tree, index, and (optionally) untracked files as a new
/// stash entry, advancing `refs/stash`.
///
/// `working_tree` is the tree OID for the stash commit itself (what `git
/// stash pop` restores). `index_tree` is the tree OID representing the
/// index as it stood at stash time. `untracked_tree`, if given, is stored
/// as a third parent holding untracked files.
pub fn push(
    repo: &mut Repository,
    working_tree: ObjectId,
    index_tree: ObjectId,
    untracked_tree: Option<ObjectId>,
    message: Option<String>,
) -> Result<ObjectId, RepoError> {
    let head_oid = repo
        .head_oid()?
        .ok_or(RepoError::NothingToStash)?;
    let branch = repo.current_branch()?.unwrap_or_else(|| "HEAD".to_string());
    let identity = resolve_identity(repo);

    let index_commit = build_commit(
        index_tree,
        vec![head_oid],
        identity.clone(),
        format!("index on {branch}: WIP"),
    );
    let index_oid = repo.odb().write(&Object::Commit(index_commit))?;

    let mut parents = vec![head_oid, index_oid];
    if let Some(untracked_tree) = untracked_tree {
        let untracked_commit = build_commit(
            untracked_tree,
            Vec::new(),
            identity.clone(),
            format!("untracked files on {branch}: WIP"),
        );
        parents.push(repo.odb().write(&Object::Commit(untracked_commit))?);
    }

    let summary = message.unwrap_or_else(|| format!("WIP on {branch}"));
    let stash_commit = build_commit(working_tree, parents, identity.clone(), summary.clone());
    let stash_oid = repo.odb().write(&Object::Commit(stash_commit))?;

    let stash_ref = RefName::new(STASH_REF)?;
    let old_oid = repo
        .refs()
        .resolve_to_oid(&stash_ref)?
        .unwrap_or(ObjectId::NULL_SHA1);
    repo.refs().write_ref(&stash_ref, &stash_oid)?;

    reflog::append_reflog_entry(
        repo.common_dir(),
        &stash_ref,
        &reflog::ReflogEntry {
            old_oid,
            new_oid: stash_oid,
            identity,
            message: BString::from(summary),
        },
    )?;

    Ok(stash_oid)
}

/// Remove stash entry `n` (0 = most recent). If `n` is the current top,
/// `refs/stash` is moved to entry 1 (or deleted if none remain).
pub fn drop(repo: &Repository, n: usize) -> Result<(), RepoError> {
    let stash_ref = RefName::new(STASH_REF)?;
    let entries = repo.refs().reflog(&stash_ref)?;
    if n >= entries.len() {
        return Err(RepoError::NoStashEntry(n));
    }

    reflog::delete_reflog_entry(repo.common_dir(), &stash_ref, n)?;

    if n == 0 {
        match entries.get(1) {
            Some(next) => repo.refs().write_ref(&stash_ref, &next.new_oid)?,
            None => repo.refs().delete_ref(&stash_ref)?,
        }
    }

    Ok(())
}

/// Remove every stash entry and delete `refs/stash` along with its reflog.
pub fn clear(repo: &Repository) -> Result<(), RepoError> {
    let stash_ref = RefName::new(STASH_REF)?;
    if repo.refs().resolve_to_oid(&stash_ref)?.is_some() {
        repo.refs().delete_ref(&stash_ref)?;
    }

    let path = reflog::reflog_path(repo.common_dir(), &stash_ref);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepoError::Io(e)),
    }
}

fn build_commit(tree: ObjectId, parents: Vec<ObjectId>, identity: Signature, message: String) -> Commit {
    Commit {
        tree,
        parents,
        author: identity.clone(),
        committer: identity,
        encoding: None,
        gpgsig: None,
        extra_headers: Vec::new(),
        message: BString::from(message),
    }
}

/// Resolve the identity to stamp on stash commits, following the same
/// cascade as `git commit`: `user.name`/`user.email` in config, then
/// `GIT_AUTHOR_NAME`/`GIT_AUTHOR_EMAIL`, then a generic fallback.
fn resolve_identity(repo: &Repository) -> Signature {
    let name = repo
        .config()
        .get_string("user.name")
        .ok()
        .flatten()
        .or_else(|| std::env::var("GIT_AUTHOR_NAME").ok())
        .unwrap_or_else(|| "Unknown".to_string());

    let email = repo
        .config()
        .get_string("user.email")
        .ok()
        .flatten()
        .or_else(|| std::env::var("GIT_AUTHOR_EMAIL").ok())
        .unwrap_or_else(|| "unknown@localhost".to_string());

    Signature {
        name: BString::from(name),
        email: BString::from(email),
        date: GitDate::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn setup_repo_with_commit() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let work_tree = std::fs::canonicalize(dir.path()).unwrap();

        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(&work_tree)
                .env("GIT_AUTHOR_NAME", "Test")
                .env("GIT_AUTHOR_EMAIL", "test@example.com")
                .env("GIT_COMMITTER_NAME", "Test")
                .env("GIT_COMMITTER_EMAIL", "test@example.com")
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .unwrap()
        };

        assert!(run(&["init"]).success());
        assert!(run(&["commit", "--allow-empty", "-m", "initial"]).success());

        (dir, work_tree)
    }

    #[test]
    fn empty_list_on_fresh_repo() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let repo = Repository::open(&work_tree).unwrap();
        assert!(list(&repo).unwrap().is_empty());
    }

    #[test]
    fn push_creates_entry_and_advances_ref() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let mut repo = Repository::open(&work_tree).unwrap();
        let head_oid = repo.head_oid().unwrap().unwrap();

        let stash_oid = push(&mut repo, head_oid, head_oid, None, None).unwrap();

        let entries = list(&repo).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].oid, stash_oid);
        assert_eq!(entries[0].index, 0);

        let stash_ref = RefName::new(STASH_REF).unwrap();
        assert_eq!(repo.refs().resolve_to_oid(&stash_ref).unwrap(), Some(stash_oid));
    }

    #[test]
    fn push_records_two_parent_commit() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let mut repo = Repository::open(&work_tree).unwrap();
        let head_oid = repo.head_oid().unwrap().unwrap();

        let stash_oid = push(&mut repo, head_oid, head_oid, None, Some("on main: testing".into()))
            .unwrap();

        match repo.odb().read(&stash_oid).unwrap().unwrap() {
            Object::Commit(c) => {
                assert_eq!(c.parents.len(), 2);
                assert_eq!(c.parents[0], head_oid);
                assert_eq!(c.message, BString::from("on main: testing"));
            }
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn drop_top_moves_ref_to_next() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let mut repo = Repository::open(&work_tree).unwrap();
        let head_oid = repo.head_oid().unwrap().unwrap();

        let first = push(&mut repo, head_oid, head_oid, None, Some("first".into())).unwrap();
        let _second = push(&mut repo, head_oid, head_oid, None, Some("second".into())).unwrap();

        drop(&repo, 0).unwrap();

        let stash_ref = RefName::new(STASH_REF).unwrap();
        assert_eq!(repo.refs().resolve_to_oid(&stash_ref).unwrap(), Some(first));
        assert_eq!(list(&repo).unwrap().len(), 1);
    }

    #[test]
    fn drop_last_entry_deletes_ref() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let mut repo = Repository::open(&work_tree).unwrap();
        let head_oid = repo.head_oid().unwrap().unwrap();

        push(&mut repo, head_oid, head_oid, None, None).unwrap();
        drop(&repo, 0).unwrap();

        let stash_ref = RefName::new(STASH_REF).unwrap();
        assert_eq!(repo.refs().resolve_to_oid(&stash_ref).unwrap(), None);
        assert!(list(&repo).unwrap().is_empty());
    }

    #[test]
    fn drop_out_of_range_errors() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let repo = Repository::open(&work_tree).unwrap();
        assert!(matches!(drop(&repo, 0), Err(RepoError::NoStashEntry(0))));
    }

    #[test]
    fn clear_removes_ref_and_reflog() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let mut repo = Repository::open(&work_tree).unwrap();
        let head_oid = repo.head_oid().unwrap().unwrap();

        push(&mut repo, head_oid, head_oid, None, None).unwrap();
        clear(&repo).unwrap();

        assert!(list(&repo).unwrap().is_empty());
        let stash_ref = RefName::new(STASH_REF).unwrap();
        assert_eq!(repo.refs().resolve_to_oid(&stash_ref).unwrap(), None);
    }

    #[test]
    fn nothing_to_stash_on_unborn_repo() {
        let dir = tempfile::tempdir().unwrap();
        let _repo = Repository::init(dir.path()).unwrap();
        let work_tree = std::fs::canonicalize(dir.path()).unwrap();
        let mut repo = Repository::open(&work_tree).unwrap();

        let tree = ObjectId::NULL_SHA1;
        assert!(matches!(
            push(&mut repo, tree, tree, None, None),
            Err(RepoError::NothingToStash)
        ));
    }
}

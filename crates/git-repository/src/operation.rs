//! Operation-in-progress state: merge, rebase, cherry-pick, revert.
//!
//! None of these operations maintain their own state machine. Instead, each
//! is identified by the presence of a well-known file or directory under the
//! git directory — the same convention C git uses for `MERGE_HEAD`,
//! `CHERRY_PICK_HEAD`, `REVERT_HEAD`, and the `rebase-merge`/`rebase-apply`
//! directories. Presence or absence of these is the whole state machine.

use std::collections::BTreeMap;
use std::path::Path;

use bstr::BString;
use git_hash::ObjectId;
use git_index::{Index, IndexEntry, Stage, StatData, EntryFlags};
use git_object::{FileMode, Object, Tree};

use crate::{RepoError, Repository};

/// Which kind of operation is currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Merge,
    Rebase,
    CherryPick,
    Revert,
}

/// Determine which operation (if any) is currently in progress.
///
/// Checks in a fixed order; only one of these is expected to be true at a
/// time, but if several state files happen to coexist, merge takes priority
/// over cherry-pick/revert, which take priority over a stray rebase directory.
pub fn current_operation(repo: &Repository) -> Option<OperationKind> {
    let git_dir = repo.git_dir();
    if git_dir.join("MERGE_HEAD").is_file() {
        return Some(OperationKind::Merge);
    }
    if git_dir.join("CHERRY_PICK_HEAD").is_file() {
        return Some(OperationKind::CherryPick);
    }
    if git_dir.join("REVERT_HEAD").is_file() {
        return Some(OperationKind::Revert);
    }
    if git_dir.join("rebase-merge").is_dir() || git_dir.join("rebase-apply").is_dir() {
        return Some(OperationKind::Rebase);
    }
    None
}

/// Is any operation currently in progress?
pub fn has_operation_in_progress(repo: &Repository) -> bool {
    current_operation(repo).is_some()
}

/// Abort the in-progress operation: remove its state files and restore the
/// index to match HEAD's tree.
///
/// Returns [`RepoError::NoOperationInProgress`] if nothing is in progress.
pub fn abort_operation(repo: &mut Repository) -> Result<(), RepoError> {
    let op = current_operation(repo).ok_or(RepoError::NoOperationInProgress)?;
    remove_operation_state(repo.git_dir(), op)?;
    restore_index_from_head(repo)?;
    Ok(())
}

fn remove_operation_state(git_dir: &Path, op: OperationKind) -> Result<(), RepoError> {
    match op {
        OperationKind::Merge => {
            remove_file_if_exists(&git_dir.join("MERGE_HEAD"))?;
            remove_file_if_exists(&git_dir.join("MERGE_MSG"))?;
            remove_file_if_exists(&git_dir.join("MERGE_MODE"))?;
        }
        OperationKind::CherryPick => {
            remove_file_if_exists(&git_dir.join("CHERRY_PICK_HEAD"))?;
            remove_file_if_exists(&git_dir.join("MERGE_MSG"))?;
        }
        OperationKind::Revert => {
            remove_file_if_exists(&git_dir.join("REVERT_HEAD"))?;
            remove_file_if_exists(&git_dir.join("MERGE_MSG"))?;
        }
        OperationKind::Rebase => {
            remove_dir_if_exists(&git_dir.join("rebase-merge"))?;
            remove_dir_if_exists(&git_dir.join("rebase-apply"))?;
        }
    }
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Replace the in-memory and on-disk index with a fresh one built from
/// HEAD's tree, clearing any conflict stages left behind by the aborted
/// operation.
fn restore_index_from_head(repo: &mut Repository) -> Result<(), RepoError> {
    let head_oid = repo.head_oid()?.ok_or_else(|| {
        RepoError::InvalidHead("HEAD has no commit to restore the index from".into())
    })?;
    let tree = read_commit_tree(repo, &head_oid)?;
    let flat = flatten_tree(repo, &tree, &BString::from(""))?;

    let mut index = Index::new();
    for (path, (oid, mode)) in flat {
        index.add(IndexEntry {
            path,
            oid,
            mode,
            stage: Stage::Normal,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        });
    }

    repo.set_index(index);
    repo.write_index()
}

fn read_commit_tree(repo: &Repository, commit_oid: &ObjectId) -> Result<Tree, RepoError> {
    let commit = match repo
        .odb()
        .read(commit_oid)?
        .ok_or_else(|| RepoError::InvalidHead(format!("object {commit_oid} not found")))?
    {
        Object::Commit(c) => c,
        other => {
            return Err(RepoError::InvalidHead(format!(
                "{commit_oid} is a {}, not a commit",
                other.object_type()
            )))
        }
    };
    read_tree(repo, &commit.tree)
}

fn read_tree(repo: &Repository, tree_oid: &ObjectId) -> Result<Tree, RepoError> {
    match repo
        .odb()
        .read(tree_oid)?
        .ok_or_else(|| RepoError::InvalidHead(format!("tree {tree_oid} not found")))?
    {
        Object::Tree(t) => Ok(t),
        other => Err(RepoError::InvalidHead(format!(
            "{tree_oid} is a {}, not a tree",
            other.object_type()
        ))),
    }
}

/// Flatten a tree into path -> (oid, mode) pairs, recursing into subtrees.
fn flatten_tree(
    repo: &Repository,
    tree: &Tree,
    prefix: &BString,
) -> Result<BTreeMap<BString, (ObjectId, FileMode)>, RepoError> {
    let mut map = BTreeMap::new();
    for entry in &tree.entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            let mut p = prefix.clone();
            p.push(b'/');
            p.extend_from_slice(&entry.name);
            p
        };

        if entry.mode.is_tree() {
            let sub = read_tree(repo, &entry.oid)?;
            map.extend(flatten_tree(repo, &sub, &path)?);
        } else {
            map.insert(path, (entry.oid, entry.mode));
        }
    }
    Ok(map)
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
    fn no_operation_on_clean_repo() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let repo = Repository::open(&work_tree).unwrap();
        assert_eq!(current_operation(&repo), None);
        assert!(!has_operation_in_progress(&repo));
    }

    #[test]
    fn merge_head_detected() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let repo = Repository::open(&work_tree).unwrap();
        std::fs::write(
            repo.git_dir().join("MERGE_HEAD"),
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n",
        )
        .unwrap();

        assert_eq!(current_operation(&repo), Some(OperationKind::Merge));
        assert!(has_operation_in_progress(&repo));
    }

    #[test]
    fn rebase_merge_dir_detected() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let repo = Repository::open(&work_tree).unwrap();
        std::fs::create_dir(repo.git_dir().join("rebase-merge")).unwrap();

        assert_eq!(current_operation(&repo), Some(OperationKind::Rebase));
    }

    #[test]
    fn abort_with_no_operation_errors() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let mut repo = Repository::open(&work_tree).unwrap();
        assert!(matches!(
            abort_operation(&mut repo),
            Err(RepoError::NoOperationInProgress)
        ));
    }

    #[test]
    fn abort_merge_clears_state_and_restores_index() {
        let (_dir, work_tree) = setup_repo_with_commit();
        let mut repo = Repository::open(&work_tree).unwrap();

        std::fs::write(
            repo.git_dir().join("MERGE_HEAD"),
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n",
        )
        .unwrap();
        std::fs::write(repo.git_dir().join("MERGE_MSG"), "merge in progress\n").unwrap();

        abort_operation(&mut repo).unwrap();

        assert!(!repo.git_dir().join("MERGE_HEAD").exists());
        assert!(!repo.git_dir().join("MERGE_MSG").exists());
        assert_eq!(current_operation(&repo), None);

        let index = Index::read_from(repo.git_dir().join("index")).unwrap();
        assert_eq!(index.len(), 0); // initial commit was empty
    }
}

//! Object listing: enumerate all objects reachable from a set of commits.
//!
//! Used by pack generation and repack/GC to decide which objects a new pack
//! must contain.

use std::collections::HashSet;

use git_hash::ObjectId;
use git_object::Object;
use git_repository::Repository;

use crate::RevWalkError;

/// List all objects reachable from the given commits, excluding objects
/// reachable from the excluded set.
///
/// Returns OIDs of all commits, trees, and blobs reachable from `include`
/// but not from `exclude`.
pub fn list_objects(
    repo: &Repository,
    include: &[ObjectId],
    exclude: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut result = Vec::new();
    let mut seen = HashSet::new();

    // First, collect all objects reachable from excluded commits.
    let mut excluded_objects = HashSet::new();
    for oid in exclude {
        collect_reachable(repo, oid, &mut excluded_objects)?;
    }

    // Now collect all objects reachable from included commits,
    // skipping anything in the excluded set.
    for oid in include {
        collect_reachable_filtered(repo, oid, &mut seen, &excluded_objects, &mut result)?;
    }

    Ok(result)
}

/// Collect all objects reachable from a commit (commits, trees, blobs).
fn collect_reachable(
    repo: &Repository,
    start: &ObjectId,
    seen: &mut HashSet<ObjectId>,
) -> Result<(), RevWalkError> {
    let mut stack = vec![*start];

    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }

        let obj = match repo.odb().read(&oid)? {
            Some(obj) => obj,
            None => continue,
        };

        match obj {
            Object::Commit(commit) => {
                stack.push(commit.tree);
                for parent in &commit.parents {
                    stack.push(*parent);
                }
            }
            Object::Tree(tree) => {
                for entry in &tree.entries {
                    stack.push(entry.oid);
                }
            }
            Object::Blob(_) => {}
            Object::Tag(tag) => {
                stack.push(tag.target);
            }
        }
    }

    Ok(())
}

/// Collect reachable objects with exclusion filtering.
fn collect_reachable_filtered(
    repo: &Repository,
    start: &ObjectId,
    seen: &mut HashSet<ObjectId>,
    excluded: &HashSet<ObjectId>,
    result: &mut Vec<ObjectId>,
) -> Result<(), RevWalkError> {
    let mut stack = vec![*start];

    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) || excluded.contains(&oid) {
            continue;
        }

        let obj = match repo.odb().read(&oid)? {
            Some(obj) => obj,
            None => continue,
        };

        match &obj {
            Object::Commit(commit) => {
                result.push(oid);
                stack.push(commit.tree);
                for parent in &commit.parents {
                    stack.push(*parent);
                }
            }
            Object::Tree(tree) => {
                result.push(oid);
                for entry in &tree.entries {
                    if !excluded.contains(&entry.oid) && !seen.contains(&entry.oid) {
                        stack.push(entry.oid);
                    }
                }
            }
            Object::Blob(_) => {
                result.push(oid);
            }
            Object::Tag(tag) => {
                result.push(oid);
                stack.push(tag.target);
            }
        }
    }

    Ok(())
}

//! Flattening a snapshot tree into `path -> node` listings.

use std::collections::BTreeMap;

use crate::storage::{SnapshotNode, StorageResult};

/// List the children of `node`, keyed by their path below it.
///
/// Sub-trees are listed themselves; with `recursive` their contents follow
/// under `dir/name` keys. `prefix` is prepended to every key.
pub fn list<N: SnapshotNode>(
    node: &N,
    recursive: bool,
    prefix: Option<&str>,
) -> StorageResult<BTreeMap<String, N>> {
    let mut out = BTreeMap::new();
    collect(node, recursive, prefix, &mut out)?;
    Ok(out)
}

fn collect<N: SnapshotNode>(
    node: &N,
    recursive: bool,
    prefix: Option<&str>,
    out: &mut BTreeMap<String, N>,
) -> StorageResult<()> {
    for (name, child) in node.children()? {
        let path = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, name),
            _ => name,
        };
        if recursive && child.is_tree() {
            collect(&child, true, Some(&path), out)?;
        }
        out.insert(path, child);
    }
    Ok(())
}

//! Read-side walks over an emitted DAG.

use std::collections::HashSet;

use cairn_types::{Cid, Link, Node};

use crate::dir::name_bucket;
use crate::error::DagError;
use crate::sink::BlockSource;

/// Find the entry called `name` in the directory rooted at `root`.
///
/// Sharded directories are descended by name hash, one bucket per level,
/// without scanning sibling buckets.
pub fn lookup(
    source: &dyn BlockSource,
    root: &Cid,
    name: &str,
) -> Result<Option<Link>, DagError> {
    let mut cid = *root;
    loop {
        match source.get_node(&cid)? {
            Node::Directory { links } => {
                return Ok(links.into_iter().find(|l| l.name == name));
            }
            Node::Shard {
                fanout_bits,
                depth,
                buckets,
            } => {
                let index = name_bucket(name, depth as usize, fanout_bits);
                match buckets.into_iter().find(|b| b.index == index) {
                    Some(bucket) => cid = bucket.link.cid,
                    None => return Ok(None),
                }
            }
            _ => return Err(DagError::NotADirectory(cid)),
        }
    }
}

/// Resolve a `/`-separated path below `root`.
pub fn resolve(
    source: &dyn BlockSource,
    root: &Cid,
    path: &str,
) -> Result<Option<Link>, DagError> {
    let mut current: Option<Link> = None;
    let mut cid = *root;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        match lookup(source, &cid, part)? {
            Some(link) => {
                cid = link.cid;
                current = Some(link);
            }
            None => return Ok(None),
        }
    }
    Ok(current)
}

/// Every entry of a directory, flattening shard levels in bucket order.
pub fn list(source: &dyn BlockSource, root: &Cid) -> Result<Vec<Link>, DagError> {
    let mut out = Vec::new();
    collect_entries(source, root, &mut out)?;
    Ok(out)
}

fn collect_entries(
    source: &dyn BlockSource,
    cid: &Cid,
    out: &mut Vec<Link>,
) -> Result<(), DagError> {
    match source.get_node(cid)? {
        Node::Directory { links } => out.extend(links),
        Node::Shard { buckets, .. } => {
            for bucket in buckets {
                collect_entries(source, &bucket.link.cid, out)?;
            }
        }
        _ => return Err(DagError::NotADirectory(*cid)),
    }
    Ok(())
}

/// Distinct CIDs reachable from `root`, root first, depth-first.
///
/// Fails with [`DagError::MissingBlock`] on the first absent block.
pub fn reachable(source: &dyn BlockSource, root: &Cid) -> Result<Vec<Cid>, DagError> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![*root];
    while let Some(cid) = stack.pop() {
        if !seen.insert(cid) {
            continue;
        }
        let node = source.get_node(&cid)?;
        order.push(cid);
        for link in node.links().into_iter().rev() {
            stack.push(link.cid);
        }
    }
    Ok(order)
}

/// Read back the full content of a file DAG.
pub fn read_file(source: &dyn BlockSource, root: &Cid) -> Result<Vec<u8>, DagError> {
    let mut out = Vec::new();
    let mut stack = vec![*root];
    while let Some(cid) = stack.pop() {
        match source.get_node(&cid)? {
            Node::Raw(data) => out.extend_from_slice(&data),
            Node::File { links, .. } => stack.extend(links.iter().rev().map(|l| l.cid)),
            _ => return Err(DagError::NotAFile(cid)),
        }
    }
    Ok(out)
}

/// Height of a file DAG: 0 for a single leaf.
pub fn file_depth(source: &dyn BlockSource, root: &Cid) -> Result<usize, DagError> {
    match source.get_node(root)? {
        Node::File { links, .. } => {
            let mut deepest = 0;
            for link in &links {
                deepest = deepest.max(file_depth(source, &link.cid)?);
            }
            Ok(deepest + 1)
        }
        _ => Ok(0),
    }
}

/// Shard levels below a directory root: 0 for a flat directory.
pub fn shard_depth(source: &dyn BlockSource, root: &Cid) -> Result<usize, DagError> {
    match source.get_node(root)? {
        Node::Shard { buckets, .. } => {
            let mut deepest = 0;
            for bucket in &buckets {
                deepest = deepest.max(shard_depth(source, &bucket.link.cid)?);
            }
            Ok(deepest + 1)
        }
        _ => Ok(0),
    }
}

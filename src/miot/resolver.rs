//! Description-path resolution.
//!
//! Profiles name properties by the chain of human-readable descriptions leading to
//! them ("Air Purifier" / "Switch Status"). Devices are read by the matching chain of
//! numeric iids. Resolution is all-or-nothing: a path that matches only a prefix of
//! its segments resolves to nothing.

use crate::miot::spec::{ServiceNode, SpecTree};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The iid chain of a resolved node, service first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyPath(Vec<u32>);

impl PropertyPath {
    pub fn new(iids: Vec<u32>) -> Self {
        Self(iids)
    }

    pub fn iids(&self) -> &[u32] {
        &self.0
    }

    /// The iid of the top-level service.
    pub fn siid(&self) -> Option<u32> {
        self.0.first().copied()
    }

    /// The iid of the addressed node itself.
    pub fn piid(&self) -> Option<u32> {
        self.0.last().copied()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// A path that could not be resolved against a tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no node described as `{segment}` at depth {depth}")]
pub struct ResolutionFailure {
    /// The first segment without a matching sibling
    pub segment: String,
    /// Zero-based depth of that segment
    pub depth: usize,
}

/// A labeled description path as configured in a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPath {
    pub label: String,
    pub segments: Vec<String>,
}

impl NamedPath {
    /// Build a path labeled by its segments joined with `/`.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self {
            label: segments.join("/"),
            segments,
        }
    }
}

/// A named path bound to its iid chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProperty {
    pub label: String,
    pub path: PropertyPath,
}

/// Resolve one description path against a tree.
///
/// At every depth the siblings are scanned in order and the first one whose
/// description equals the segment exactly is taken. An empty path never resolves.
pub fn resolve<S: AsRef<str>>(
    tree: &SpecTree,
    segments: &[S],
) -> Result<PropertyPath, ResolutionFailure> {
    if segments.is_empty() {
        return Err(ResolutionFailure {
            segment: String::new(),
            depth: 0,
        });
    }

    let mut level: &[ServiceNode] = &tree.services;
    let mut iids = Vec::with_capacity(segments.len());

    for (depth, segment) in segments.iter().enumerate() {
        let segment = segment.as_ref();
        let node = level
            .iter()
            .find(|node| node.description == segment)
            .ok_or_else(|| ResolutionFailure {
                segment: segment.to_string(),
                depth,
            })?;

        iids.push(node.iid);
        level = node.children();
    }

    Ok(PropertyPath(iids))
}

/// Resolve a set of named paths, keeping input order.
///
/// Unresolved paths are returned separately. Paths sharing a label collapse into
/// the first one.
pub fn resolve_all(
    tree: &SpecTree,
    paths: &[NamedPath],
) -> (Vec<ResolvedProperty>, Vec<(NamedPath, ResolutionFailure)>) {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(paths.len());
    let mut unresolved = Vec::new();

    for named in paths {
        if !seen.insert(named.label.as_str()) {
            continue;
        }

        match resolve(tree, &named.segments) {
            Ok(path) if path.iids().len() == named.segments.len() => {
                resolved.push(ResolvedProperty {
                    label: named.label.clone(),
                    path,
                });
            }
            Ok(_) => {}
            Err(failure) => unresolved.push((named.clone(), failure)),
        }
    }

    (resolved, unresolved)
}

//! Per-model capability descriptors.
//!
//! A descriptor is a tree of named services, each carrying its properties. Nodes are
//! addressed by their numeric `iid` on the wire and by their human-readable
//! `description` in profiles.

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Access right advertised by a property node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
    Notify,
    /// Any access right this crate does not know about
    #[serde(other)]
    Other,
}

impl Access {
    fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::Notify => "notify",
            Access::Other => "other",
        }
    }
}

/// One service or property in a descriptor tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNode {
    /// Service or property index, unique among siblings on the wire
    pub iid: u32,
    /// Capability URN
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable name, not guaranteed unique among siblings
    pub description: String,
    /// Access rights, present on properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Vec<Access>>,
    /// Child nodes, present on services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<ServiceNode>>,
}

impl ServiceNode {
    /// Children of this node, empty for leaves.
    pub fn children(&self) -> &[ServiceNode] {
        self.properties.as_deref().unwrap_or_default()
    }

    /// Whether the node advertises the given access right.
    pub fn has_access(&self, access: Access) -> bool {
        self.access
            .as_ref()
            .map(|rights| rights.contains(&access))
            .unwrap_or(false)
    }
}

/// The descriptor of one device model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecTree {
    /// Device URN
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable device name
    pub description: String,
    /// Top-level services in descriptor order
    pub services: Vec<ServiceNode>,
}

impl SpecTree {
    /// Build a tree from the raw descriptor returned by the descriptor service.
    ///
    /// Fails with [`ExporterError::MalformedSpec`] when `services` is missing or any
    /// node lacks `iid`, `type` or `description`.
    pub fn from_value(model: &str, raw: serde_json::Value) -> Result<Self> {
        serde_json::from_value(raw)
            .map_err(|err| ExporterError::malformed_spec(model, err.to_string()))
    }

    /// Walk the tree by iid chain and return the description of every node on the way.
    ///
    /// Siblings are scanned in order and the first iid match wins.
    pub fn descriptions_for(&self, iids: &[u32]) -> Option<Vec<&str>> {
        let mut level: &[ServiceNode] = &self.services;
        let mut descriptions = Vec::with_capacity(iids.len());

        for iid in iids {
            let node = level.iter().find(|node| node.iid == *iid)?;
            descriptions.push(node.description.as_str());
            level = node.children();
        }

        Some(descriptions)
    }

    /// Render an indented `iid description [access]` listing of the tree.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({})", self.description, self.kind);
        for service in &self.services {
            write_node(&mut out, service, 1);
        }
        out
    }
}

fn write_node(out: &mut String, node: &ServiceNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{}{} {}", indent, node.iid, node.description);
    if let Some(access) = &node.access {
        let rights: Vec<&str> = access.iter().map(Access::as_str).collect();
        let _ = write!(out, " [{}]", rights.join(","));
    }
    out.push('\n');

    for child in node.children() {
        write_node(out, child, depth + 1);
    }
}

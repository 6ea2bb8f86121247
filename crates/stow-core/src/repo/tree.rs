use serde::{Deserialize, Serialize};

use stow_types::error::Result;
use stow_types::BlobId;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Dir,
    Symlink,
}

/// One directory entry of a tree blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub node_type: NodeType,
    /// Data blobs holding a file's content, in order.
    #[serde(default)]
    pub content: Vec<BlobId>,
    /// Tree blob of a directory.
    #[serde(default)]
    pub subtree: Option<BlobId>,
}

impl Node {
    pub fn file(name: &str, content: Vec<BlobId>) -> Self {
        Self {
            name: name.to_string(),
            node_type: NodeType::File,
            content,
            subtree: None,
        }
    }

    pub fn dir(name: &str, subtree: BlobId) -> Self {
        Self {
            name: name.to_string(),
            node_type: NodeType::Dir,
            content: Vec::new(),
            subtree: Some(subtree),
        }
    }
}

/// Decoded directory listing. Serialized as msgpack into a tree blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

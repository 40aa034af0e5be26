//! Node sources: named groups of nodes added and removed together

use std::collections::BTreeSet;

/// Name of the source that receives nodes added without one
pub const DEFAULT_SOURCE: &str = "Default";

#[derive(Debug)]
pub struct NodeSource {
    name: String,
    nodes: BTreeSet<String>,
    removing: bool,
}

impl NodeSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: BTreeSet::new(),
            removing: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_SOURCE
    }

    /// Urls of the nodes currently owned by this source
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_removing(&self) -> bool {
        self.removing
    }

    pub(crate) fn mark_removing(&mut self) {
        self.removing = true;
    }

    pub(crate) fn add(&mut self, url: &str) {
        self.nodes.insert(url.to_string());
    }

    pub(crate) fn remove(&mut self, url: &str) {
        self.nodes.remove(url);
    }
}

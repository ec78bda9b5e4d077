//! Declarative node descriptions.
//!
//! Templates arrive as `NodeSpec` trees (inline in a control descriptor or
//! from a [`TemplateSource`](crate::binding::TemplateSource)) and are built
//! into the document on demand. The JSON form is untagged: a string is a
//! text node, an object with a `tag` is an element.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Text(String),
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        attributes: IndexMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<NodeSpec>,
    },
}

impl NodeSpec {
    pub fn element(tag: impl Into<String>) -> Self {
        NodeSpec::Element {
            tag: tag.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        NodeSpec::Text(text.into())
    }

    /// Add an attribute. No effect on text specs.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let NodeSpec::Element { attributes, .. } = &mut self {
            attributes.insert(name.into(), value.into());
        }
        self
    }

    /// Append a child. No effect on text specs.
    pub fn child(mut self, child: NodeSpec) -> Self {
        if let NodeSpec::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Parse a template body: either a single node or a list of nodes.
    pub fn parse_list(json: &str) -> Result<Vec<NodeSpec>, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<NodeSpec>),
            One(NodeSpec),
        }

        Ok(match serde_json::from_str(json)? {
            OneOrMany::Many(nodes) => nodes,
            OneOrMany::One(node) => vec![node],
        })
    }
}

use super::super::{FmtError, Format};
use super::{is_blank, normalize_root};
use crate::tree::Node;

/// YAML format using `serde_yaml`.
pub struct Yaml;

impl Format for Yaml {
    fn extensions(&self) -> &'static [&'static str] {
        &["yaml", "yml"]
    }

    fn parse(&self, input: &[u8]) -> Result<Node, FmtError> {
        if is_blank(input) {
            return Ok(Node::object());
        }
        serde_yaml::from_slice(input)
            .map(normalize_root)
            .map_err(|e| FmtError::ParseError(e.to_string()))
    }

    fn render(&self, node: &Node) -> Result<Vec<u8>, FmtError> {
        serde_yaml::to_string(node)
            .map(String::into_bytes)
            .map_err(|e| FmtError::Render(e.to_string()))
    }
}

/* src/loader/format/json.rs */

use super::super::{FmtError, Format};
use super::{is_blank, normalize_root};
use crate::tree::Node;

/// JSON format using `serde_json`.
pub struct Json;

impl Format for Json {
	fn extensions(&self) -> &'static [&'static str] {
		&["json"]
	}

	fn parse(&self, input: &[u8]) -> Result<Node, FmtError> {
		if is_blank(input) {
			return Ok(Node::object());
		}
		serde_json::from_slice(input)
			.map(normalize_root)
			.map_err(|e| FmtError::ParseError(e.to_string()))
	}

	fn render(&self, node: &Node) -> Result<Vec<u8>, FmtError> {
		let mut out = serde_json::to_vec_pretty(node).map_err(|e| FmtError::Render(e.to_string()))?;
		out.push(b'\n');
		Ok(out)
	}
}

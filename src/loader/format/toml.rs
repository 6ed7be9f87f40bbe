/* src/loader/format/toml.rs */

use super::super::{FmtError, Format};
use super::normalize_root;
use crate::tree::Node;

/// TOML format using `toml`.
///
/// TOML has no null; nulls are dropped on render and read back as absent.
pub struct Toml;

impl Format for Toml {
	fn extensions(&self) -> &'static [&'static str] {
		&["toml"]
	}

	fn parse(&self, input: &[u8]) -> Result<Node, FmtError> {
		let s = std::str::from_utf8(input).map_err(|e| FmtError::ParseError(e.to_string()))?;
		toml::from_str(s)
			.map(normalize_root)
			.map_err(|e| FmtError::ParseError(e.to_string()))
	}

	fn render(&self, node: &Node) -> Result<Vec<u8>, FmtError> {
		toml::to_string_pretty(&node.without_nulls())
			.map(String::into_bytes)
			.map_err(|e| FmtError::Render(e.to_string()))
	}
}

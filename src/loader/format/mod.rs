/* src/loader/format/mod.rs */

use std::path::Path;

use super::{FmtError, Format};
use crate::tree::Node;

mod json;
pub use json::Json;

#[cfg(feature = "toml")]
mod toml;
#[cfg(feature = "toml")]
pub use toml::Toml;

#[cfg(feature = "yaml")]
mod yaml;
#[cfg(feature = "yaml")]
pub use yaml::Yaml;

#[cfg(feature = "xml")]
mod xml;
#[cfg(feature = "xml")]
pub use self::xml::Xml;

/// An enum wrapper for all supported formats, enabling dynamic dispatch-like behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnyFormat {
	#[default]
	Json,
	#[cfg(feature = "toml")]
	Toml,
	#[cfg(feature = "yaml")]
	Yaml,
	#[cfg(feature = "xml")]
	Xml,
}

impl AnyFormat {
	/// Every format enabled in this build.
	pub fn all() -> &'static [AnyFormat] {
		&[
			Self::Json,
			#[cfg(feature = "toml")]
			Self::Toml,
			#[cfg(feature = "yaml")]
			Self::Yaml,
			#[cfg(feature = "xml")]
			Self::Xml,
		]
	}

	/// Picks a format from the file extension of `path`.
	pub fn from_path(path: &Path) -> Option<AnyFormat> {
		let ext = path.extension()?.to_str()?.to_ascii_lowercase();
		Self::all()
			.iter()
			.copied()
			.find(|format| format.extensions().contains(&ext.as_str()))
	}
}

impl Format for AnyFormat {
	fn extensions(&self) -> &'static [&'static str] {
		match self {
			Self::Json => Json.extensions(),
			#[cfg(feature = "toml")]
			Self::Toml => Toml.extensions(),
			#[cfg(feature = "yaml")]
			Self::Yaml => Yaml.extensions(),
			#[cfg(feature = "xml")]
			Self::Xml => Xml.extensions(),
		}
	}

	fn parse(&self, input: &[u8]) -> Result<Node, FmtError> {
		match self {
			Self::Json => Json.parse(input),
			#[cfg(feature = "toml")]
			Self::Toml => Toml.parse(input),
			#[cfg(feature = "yaml")]
			Self::Yaml => Yaml.parse(input),
			#[cfg(feature = "xml")]
			Self::Xml => Xml.parse(input),
		}
	}

	fn render(&self, node: &Node) -> Result<Vec<u8>, FmtError> {
		match self {
			Self::Json => Json.render(node),
			#[cfg(feature = "toml")]
			Self::Toml => Toml.render(node),
			#[cfg(feature = "yaml")]
			Self::Yaml => Yaml.render(node),
			#[cfg(feature = "xml")]
			Self::Xml => Xml.render(node),
		}
	}
}

pub(crate) fn is_blank(input: &[u8]) -> bool {
	input.iter().all(u8::is_ascii_whitespace)
}

/// A document whose root is null is treated as empty.
pub(crate) fn normalize_root(node: Node) -> Node {
	if node.is_null() { Node::object() } else { node }
}

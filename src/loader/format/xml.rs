/* src/loader/format/xml.rs */

//!
//! XML mapping:
//!
//! - the root element wraps the document; its name is not significant;
//! - child elements become object keys, text-only elements become scalars;
//! - an element whose children are all `<Item>` is an array;
//! - `nil="true"` marks null, attributes otherwise read as scalar children.
//!
//! Every scalar reads back as a string; typed deserialization coerces them.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::super::{FmtError, Format};
use super::is_blank;
use crate::tree::{Node, Scalar};

/// Name of the root element written on render.
pub const ROOT_ELEMENT: &str = "Settings";

/// Name of the repeated child element holding array items.
pub const ITEM_ELEMENT: &str = "Item";

const NIL_ATTRIBUTE: &str = "nil";

/// XML format using `quick-xml`.
pub struct Xml;

impl Format for Xml {
	fn extensions(&self) -> &'static [&'static str] {
		&["xml"]
	}

	fn parse(&self, input: &[u8]) -> Result<Node, FmtError> {
		if is_blank(input) {
			return Ok(Node::object());
		}
		let text = std::str::from_utf8(input).map_err(|e| FmtError::ParseError(e.to_string()))?;
		let mut reader = Reader::from_str(text);

		let mut stack: Vec<Element> = Vec::new();
		let mut root: Option<Node> = None;

		loop {
			match reader.read_event().map_err(parse_error)? {
				Event::Start(start) => stack.push(Element::open(&start)?),
				Event::Empty(start) => {
					let node = Element::open(&start)?.close();
					attach(&mut stack, &mut root, element_name(&start)?, node)?;
				}
				Event::End(_) => {
					let element = stack
						.pop()
						.ok_or_else(|| FmtError::ParseError("unbalanced closing tag".to_string()))?;
					let name = element.name.clone();
					attach(&mut stack, &mut root, name, element.close())?;
				}
				Event::Text(text) => {
					if let Some(current) = stack.last_mut() {
						current.text.push_str(&text.unescape().map_err(parse_error)?);
					}
				}
				Event::CData(data) => {
					if let Some(current) = stack.last_mut() {
						current.text.push_str(&String::from_utf8_lossy(&data));
					}
				}
				Event::Eof => break,
				_ => {}
			}
		}

		if !stack.is_empty() {
			return Err(FmtError::ParseError("unexpected end of document".to_string()));
		}

		Ok(match root {
			Some(Node::Object(map)) => Node::Object(map),
			// <Settings/> or <Settings>text</Settings>
			_ => Node::object(),
		})
	}

	fn render(&self, node: &Node) -> Result<Vec<u8>, FmtError> {
		let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
		writer
			.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
			.map_err(render_error)?;
		write_node(&mut writer, ROOT_ELEMENT, node)?;
		let mut out = writer.into_inner();
		out.push(b'\n');
		Ok(out)
	}
}

struct Element {
	name: String,
	text: String,
	nil: bool,
	children: Vec<(String, Node)>,
}

impl Element {
	fn open(start: &BytesStart<'_>) -> Result<Self, FmtError> {
		let mut element = Element {
			name: element_name(start)?,
			text: String::new(),
			nil: false,
			children: Vec::new(),
		};

		for attribute in start.attributes() {
			let attribute = attribute.map_err(parse_error)?;
			let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
			let value = attribute.unescape_value().map_err(parse_error)?.into_owned();
			if key == NIL_ATTRIBUTE && value == "true" {
				element.nil = true;
			} else if !key.starts_with("xmlns") {
				element.children.push((key, Node::Scalar(Scalar::Str(value))));
			}
		}
		Ok(element)
	}

	fn close(self) -> Node {
		if self.nil {
			return Node::null();
		}
		if self.children.is_empty() {
			return Node::Scalar(Scalar::Str(self.text.trim().to_string()));
		}
		if self.children.iter().all(|(name, _)| name == ITEM_ELEMENT) {
			return Node::Array(self.children.into_iter().map(|(_, node)| node).collect());
		}

		let mut map: BTreeMap<String, Node> = BTreeMap::new();
		for (name, node) in self.children {
			match map.remove(&name) {
				None => {
					map.insert(name, node);
				}
				// Repeated siblings collapse into an array.
				Some(Node::Array(mut items)) => {
					items.push(node);
					map.insert(name, Node::Array(items));
				}
				Some(previous) => {
					map.insert(name, Node::Array(vec![previous, node]));
				}
			}
		}
		Node::Object(map)
	}
}

fn attach(
	stack: &mut [Element],
	root: &mut Option<Node>,
	name: String,
	node: Node,
) -> Result<(), FmtError> {
	match stack.last_mut() {
		Some(parent) => parent.children.push((name, node)),
		None if root.is_none() => *root = Some(node),
		None => return Err(FmtError::ParseError("multiple root elements".to_string())),
	}
	Ok(())
}

fn element_name(start: &BytesStart<'_>) -> Result<String, FmtError> {
	std::str::from_utf8(start.name().as_ref())
		.map(str::to_string)
		.map_err(|e| FmtError::ParseError(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, name: &str, node: &Node) -> Result<(), FmtError> {
	match node {
		Node::Scalar(Scalar::Null) => {
			let start = BytesStart::new(name).with_attributes([(NIL_ATTRIBUTE, "true")]);
			writer.write_event(Event::Empty(start)).map_err(render_error)?;
		}
		Node::Scalar(scalar) => {
			let text = match scalar {
				Scalar::Bool(b) => b.to_string(),
				Scalar::Int(i) => i.to_string(),
				Scalar::UInt(u) => u.to_string(),
				Scalar::Float(f) => f.to_string(),
				Scalar::Str(s) => s.clone(),
				Scalar::Null => String::new(),
			};
			writer
				.write_event(Event::Start(BytesStart::new(name)))
				.map_err(render_error)?;
			writer
				.write_event(Event::Text(BytesText::new(&text)))
				.map_err(render_error)?;
			writer
				.write_event(Event::End(BytesEnd::new(name)))
				.map_err(render_error)?;
		}
		Node::Array(items) if items.is_empty() => {
			writer
				.write_event(Event::Empty(BytesStart::new(name)))
				.map_err(render_error)?;
		}
		Node::Object(map) if map.is_empty() => {
			writer
				.write_event(Event::Empty(BytesStart::new(name)))
				.map_err(render_error)?;
		}
		Node::Array(items) => {
			writer
				.write_event(Event::Start(BytesStart::new(name)))
				.map_err(render_error)?;
			for item in items {
				write_node(writer, ITEM_ELEMENT, item)?;
			}
			writer
				.write_event(Event::End(BytesEnd::new(name)))
				.map_err(render_error)?;
		}
		Node::Object(map) => {
			writer
				.write_event(Event::Start(BytesStart::new(name)))
				.map_err(render_error)?;
			for (key, value) in map {
				write_node(writer, key, value)?;
			}
			writer
				.write_event(Event::End(BytesEnd::new(name)))
				.map_err(render_error)?;
		}
	}
	Ok(())
}

fn parse_error(e: impl std::fmt::Display) -> FmtError {
	FmtError::ParseError(e.to_string())
}

fn render_error(e: impl std::fmt::Display) -> FmtError {
	FmtError::Render(e.to_string())
}

/* src/tree/mod.rs */

//!
//! Format-independent document tree.
//!
//! Every supported format parses into a [`Node`] and renders from one.
//! Section merging and key deletion operate on nodes.

mod de;
mod path;

pub use de::{DeError, NodeDeserializer};
pub use path::KeyPath;

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::de::{DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::loader::FmtError;

/// A scalar leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
	Null,
	Bool(bool),
	Int(i64),
	/// Only for values above `i64::MAX`.
	UInt(u64),
	Float(f64),
	Str(String),
}

/// A node of a structured document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	Object(BTreeMap<String, Node>),
	Array(Vec<Node>),
	Scalar(Scalar),
}

impl Default for Node {
	fn default() -> Self {
		Node::Object(BTreeMap::new())
	}
}

impl Node {
	/// Creates an empty object node.
	pub fn object() -> Self {
		Self::default()
	}

	pub fn null() -> Self {
		Node::Scalar(Scalar::Null)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Node::Scalar(Scalar::Null))
	}

	pub fn as_object(&self) -> Option<&BTreeMap<String, Node>> {
		match self {
			Node::Object(map) => Some(map),
			_ => None,
		}
	}

	pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
		match self {
			Node::Object(map) => Some(map),
			_ => None,
		}
	}

	/// Reads an integer from a scalar, accepting numeric strings.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Node::Scalar(Scalar::Int(i)) => Some(*i),
			Node::Scalar(Scalar::UInt(u)) => i64::try_from(*u).ok(),
			Node::Scalar(Scalar::Float(f)) => integral(*f).and_then(|v| i64::try_from(v).ok()),
			Node::Scalar(Scalar::Str(s)) => s.trim().parse().ok(),
			_ => None,
		}
	}

	/// Returns the node at `path`, or `None` if any segment is missing.
	pub fn get(&self, path: &KeyPath) -> Option<&Node> {
		path.segments()
			.iter()
			.try_fold(self, |node, segment| node.as_object()?.get(segment))
	}

	/// Places `value` at `path`, creating absent ancestors as objects.
	///
	/// An ancestor that exists but is not an object is replaced by one.
	/// Setting the root path replaces the whole node.
	pub fn set(&mut self, path: &KeyPath, value: Node) {
		let Some((last, parents)) = path.segments().split_last() else {
			*self = value;
			return;
		};

		let mut current = self;
		for segment in parents {
			current = current
				.ensure_object()
				.entry(segment.clone())
				.or_insert_with(Node::object);
		}
		current.ensure_object().insert(last.clone(), value);
	}

	/// Removes the node at `path`. A missing path is a no-op.
	pub fn remove(&mut self, path: &KeyPath) -> Option<Node> {
		let (last, parents) = path.segments().split_last()?;
		let mut current = self;
		for segment in parents {
			current = current.as_object_mut()?.get_mut(segment)?;
		}
		current.as_object_mut()?.remove(last)
	}

	fn ensure_object(&mut self) -> &mut BTreeMap<String, Node> {
		if !matches!(self, Node::Object(_)) {
			*self = Node::object();
		}
		match self {
			Node::Object(map) => map,
			_ => unreachable!("node was just replaced by an object"),
		}
	}

	/// Drops every key of `self` that is absent from `existing` and still
	/// equal to its counterpart in `baseline`.
	///
	/// `baseline` is the value the update started from; keys that were
	/// missing on disk and were not touched stay missing.
	pub fn retain_changed(&mut self, existing: &Node, baseline: &Node) {
		let (Node::Object(map), Node::Object(on_disk), Node::Object(base)) =
			(self, existing, baseline)
		else {
			return;
		};

		map.retain(|key, value| match on_disk.get(key) {
			Some(disk_value) => {
				if let Some(base_value) = base.get(key) {
					value.retain_changed(disk_value, base_value);
				}
				true
			}
			None => base.get(key) != Some(&*value),
		});
	}

	/// Returns a copy with every null removed, for formats that cannot
	/// express null.
	pub fn without_nulls(&self) -> Node {
		match self {
			Node::Object(map) => Node::Object(
				map.iter()
					.filter(|(_, v)| !v.is_null())
					.map(|(k, v)| (k.clone(), v.without_nulls()))
					.collect(),
			),
			Node::Array(items) => Node::Array(
				items
					.iter()
					.filter(|v| !v.is_null())
					.map(Node::without_nulls)
					.collect(),
			),
			Node::Scalar(s) => Node::Scalar(s.clone()),
		}
	}

	/// Stable hash of the subtree.
	pub fn fingerprint(&self) -> u64 {
		let mut hasher = DefaultHasher::new();
		self.hash_into(&mut hasher);
		hasher.finish()
	}

	fn hash_into<H: Hasher>(&self, state: &mut H) {
		match self {
			Node::Object(map) => {
				0u8.hash(state);
				map.len().hash(state);
				for (key, value) in map {
					key.hash(state);
					value.hash_into(state);
				}
			}
			Node::Array(items) => {
				1u8.hash(state);
				items.len().hash(state);
				for item in items {
					item.hash_into(state);
				}
			}
			Node::Scalar(scalar) => {
				2u8.hash(state);
				match scalar {
					Scalar::Null => 0u8.hash(state),
					Scalar::Bool(b) => (1u8, b).hash(state),
					Scalar::Int(i) => (2u8, i).hash(state),
					Scalar::UInt(u) => (5u8, u).hash(state),
					Scalar::Float(f) => (3u8, f.to_bits()).hash(state),
					Scalar::Str(s) => (4u8, s).hash(state),
				}
			}
		}
	}
}

impl From<serde_json::Value> for Node {
	fn from(value: serde_json::Value) -> Self {
		use serde_json::Value;
		match value {
			Value::Null => Node::null(),
			Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
			Value::Number(n) => match (n.as_i64(), n.as_u64()) {
				(Some(i), _) => Node::Scalar(Scalar::Int(i)),
				(None, Some(u)) => Node::Scalar(Scalar::UInt(u)),
				(None, None) => Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
			},
			Value::String(s) => Node::Scalar(Scalar::Str(s)),
			Value::Array(items) => Node::Array(items.into_iter().map(Node::from).collect()),
			Value::Object(map) => {
				Node::Object(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
			}
		}
	}
}

/// The exact integer value of `f`, if it has one.
pub(crate) fn integral(f: f64) -> Option<i128> {
	// 2^127 is the first float outside i128.
	(f.is_finite() && f.fract() == 0.0 && f.abs() < 1.7e38).then_some(f as i128)
}

/// Serializes a typed value into a tree.
pub fn to_node<T: Serialize + ?Sized>(value: &T) -> Result<Node, FmtError> {
	serde_json::to_value(value)
		.map(Node::from)
		.map_err(|e| FmtError::Shape(e.to_string()))
}

/// Deserializes a typed value from a tree.
pub fn from_node<T: DeserializeOwned>(node: Node) -> Result<T, FmtError> {
	T::deserialize(NodeDeserializer::new(node)).map_err(|e| FmtError::Shape(e.to_string()))
}

impl Serialize for Node {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Node::Object(map) => {
				let mut out = serializer.serialize_map(Some(map.len()))?;
				for (key, value) in map {
					out.serialize_entry(key, value)?;
				}
				out.end()
			}
			Node::Array(items) => {
				let mut out = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					out.serialize_element(item)?;
				}
				out.end()
			}
			Node::Scalar(Scalar::Null) => serializer.serialize_unit(),
			Node::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
			Node::Scalar(Scalar::Int(i)) => serializer.serialize_i64(*i),
			Node::Scalar(Scalar::UInt(u)) => serializer.serialize_u64(*u),
			Node::Scalar(Scalar::Float(f)) => serializer.serialize_f64(*f),
			Node::Scalar(Scalar::Str(s)) => serializer.serialize_str(s),
		}
	}
}

impl<'de> Deserialize<'de> for Node {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(NodeVisitor)
	}
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
	type Value = Node;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("a structured document value")
	}

	fn visit_bool<E>(self, v: bool) -> Result<Node, E> {
		Ok(Node::Scalar(Scalar::Bool(v)))
	}

	fn visit_i64<E>(self, v: i64) -> Result<Node, E> {
		Ok(Node::Scalar(Scalar::Int(v)))
	}

	fn visit_u64<E>(self, v: u64) -> Result<Node, E> {
		Ok(match i64::try_from(v) {
			Ok(i) => Node::Scalar(Scalar::Int(i)),
			Err(_) => Node::Scalar(Scalar::UInt(v)),
		})
	}

	fn visit_f64<E>(self, v: f64) -> Result<Node, E> {
		Ok(Node::Scalar(Scalar::Float(v)))
	}

	fn visit_str<E>(self, v: &str) -> Result<Node, E> {
		Ok(Node::Scalar(Scalar::Str(v.to_string())))
	}

	fn visit_string<E>(self, v: String) -> Result<Node, E> {
		Ok(Node::Scalar(Scalar::Str(v)))
	}

	fn visit_unit<E>(self) -> Result<Node, E> {
		Ok(Node::null())
	}

	fn visit_none<E>(self) -> Result<Node, E> {
		Ok(Node::null())
	}

	fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
		Node::deserialize(deserializer)
	}

	fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
		let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
		while let Some(item) = seq.next_element()? {
			items.push(item);
		}
		Ok(Node::Array(items))
	}

	fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Node, A::Error> {
		let mut map = BTreeMap::new();
		while let Some((key, value)) = access.next_entry::<String, Node>()? {
			map.insert(key, value);
		}
		Ok(Node::Object(map))
	}
}

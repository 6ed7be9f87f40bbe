/* src/tree/de.rs */

//!
//! A lenient serde `Deserializer` over [`Node`].
//!
//! Formats without a type system (XML) deliver every scalar as a string, so
//! numeric, boolean and string requests coerce between scalar kinds, and an
//! empty scalar reads as an empty sequence or map.

use std::fmt;

use serde::de::value::{MapAccessDeserializer, MapDeserializer, SeqDeserializer};
use serde::de::{self, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;

use super::{Node, Scalar, integral};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct DeError(String);

impl de::Error for DeError {
	fn custom<T: fmt::Display>(msg: T) -> Self {
		DeError(msg.to_string())
	}
}

pub struct NodeDeserializer {
	node: Node,
}

impl NodeDeserializer {
	pub fn new(node: Node) -> Self {
		Self { node }
	}

	fn is_empty_scalar(&self) -> bool {
		match &self.node {
			Node::Scalar(Scalar::Null) => true,
			Node::Scalar(Scalar::Str(s)) => s.trim().is_empty(),
			_ => false,
		}
	}

	fn text(&self) -> Option<&str> {
		match &self.node {
			Node::Scalar(Scalar::Str(s)) => Some(s.trim()),
			_ => None,
		}
	}
}

impl<'de> IntoDeserializer<'de, DeError> for Node {
	type Deserializer = NodeDeserializer;

	fn into_deserializer(self) -> NodeDeserializer {
		NodeDeserializer::new(self)
	}
}

macro_rules! deserialize_integer {
	($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
		$(
			fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
				if let Some(text) = self.text() {
					if let Ok(parsed) = text.parse::<$ty>() {
						return visitor.$visit(parsed);
					}
				}
				// Integral floats are accepted only when they fit.
				if let Node::Scalar(Scalar::Float(f)) = self.node {
					if let Some(v) = integral(f).and_then(|v| <$ty>::try_from(v).ok()) {
						return visitor.$visit(v);
					}
				}
				self.deserialize_any(visitor)
			}
		)*
	};
}

impl<'de> de::Deserializer<'de> for NodeDeserializer {
	type Error = DeError;

	fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		match self.node {
			Node::Object(map) => {
				let mut access: MapDeserializer<'de, _, DeError> =
					MapDeserializer::new(map.into_iter());
				let value = visitor.visit_map(&mut access)?;
				access.end()?;
				Ok(value)
			}
			Node::Array(items) => {
				let mut access: SeqDeserializer<_, DeError> =
					SeqDeserializer::new(items.into_iter());
				let value = visitor.visit_seq(&mut access)?;
				access.end()?;
				Ok(value)
			}
			Node::Scalar(Scalar::Null) => visitor.visit_unit(),
			Node::Scalar(Scalar::Bool(b)) => visitor.visit_bool(b),
			Node::Scalar(Scalar::Int(i)) => visitor.visit_i64(i),
			Node::Scalar(Scalar::UInt(u)) => visitor.visit_u64(u),
			Node::Scalar(Scalar::Float(f)) => visitor.visit_f64(f),
			Node::Scalar(Scalar::Str(s)) => visitor.visit_string(s),
		}
	}

	deserialize_integer! {
		deserialize_i8 => visit_i8: i8,
		deserialize_i16 => visit_i16: i16,
		deserialize_i32 => visit_i32: i32,
		deserialize_i64 => visit_i64: i64,
		deserialize_u8 => visit_u8: u8,
		deserialize_u16 => visit_u16: u16,
		deserialize_u32 => visit_u32: u32,
		deserialize_u64 => visit_u64: u64,
	}

	fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		self.deserialize_f64(visitor)
	}

	fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		if let Some(parsed) = self.text().and_then(|t| t.parse::<f64>().ok()) {
			return visitor.visit_f64(parsed);
		}
		match self.node {
			Node::Scalar(Scalar::Int(i)) => return visitor.visit_f64(i as f64),
			Node::Scalar(Scalar::UInt(u)) => return visitor.visit_f64(u as f64),
			_ => {}
		}
		self.deserialize_any(visitor)
	}

	fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		match self.text() {
			Some(t) if t.eq_ignore_ascii_case("true") => visitor.visit_bool(true),
			Some(t) if t.eq_ignore_ascii_case("false") => visitor.visit_bool(false),
			_ => self.deserialize_any(visitor),
		}
	}

	fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		self.deserialize_string(visitor)
	}

	fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		match self.node {
			Node::Scalar(Scalar::Bool(b)) => visitor.visit_string(b.to_string()),
			Node::Scalar(Scalar::Int(i)) => visitor.visit_string(i.to_string()),
			Node::Scalar(Scalar::UInt(u)) => visitor.visit_string(u.to_string()),
			Node::Scalar(Scalar::Float(f)) => visitor.visit_string(f.to_string()),
			_ => self.deserialize_any(visitor),
		}
	}

	fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		match self.node {
			Node::Scalar(Scalar::Null) => visitor.visit_none(),
			_ => visitor.visit_some(self),
		}
	}

	fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		if self.is_empty_scalar() {
			visitor.visit_unit()
		} else {
			self.deserialize_any(visitor)
		}
	}

	fn deserialize_newtype_struct<V: Visitor<'de>>(
		self,
		_name: &'static str,
		visitor: V,
	) -> Result<V::Value, DeError> {
		visitor.visit_newtype_struct(self)
	}

	fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		if self.is_empty_scalar() {
			return NodeDeserializer::new(Node::Array(Vec::new())).deserialize_any(visitor);
		}
		self.deserialize_any(visitor)
	}

	fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DeError> {
		self.deserialize_seq(visitor)
	}

	fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
		if self.is_empty_scalar() {
			return NodeDeserializer::new(Node::object()).deserialize_any(visitor);
		}
		self.deserialize_any(visitor)
	}

	fn deserialize_struct<V: Visitor<'de>>(
		self,
		_name: &'static str,
		_fields: &'static [&'static str],
		visitor: V,
	) -> Result<V::Value, DeError> {
		self.deserialize_map(visitor)
	}

	fn deserialize_enum<V: Visitor<'de>>(
		self,
		_name: &'static str,
		_variants: &'static [&'static str],
		visitor: V,
	) -> Result<V::Value, DeError> {
		match self.node {
			Node::Scalar(Scalar::Str(s)) => visitor.visit_enum(s.into_deserializer()),
			Node::Object(map) => {
				visitor.visit_enum(MapAccessDeserializer::new(MapDeserializer::new(map.into_iter())))
			}
			other => Err(de::Error::custom(format!(
				"expected an enum variant, found {other:?}"
			))),
		}
	}

	forward_to_deserialize_any! {
		char bytes byte_buf unit_struct tuple_struct identifier ignored_any
	}
}

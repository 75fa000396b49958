#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::schema::WireType;

/// A single decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Value {
	Bool(bool),
	/// Unsigned integer kinds (`uint32`, `uint64`, `fixed32`, `fixed64`).
	Uint(u64),
	/// Signed integer kinds (`int*`, `sint*`, `sfixed*`).
	Int(i64),
	Float(f32),
	Double(f64),
	Bytes(Vec<u8>),
	Text(String),
	/// A nested message governed by its own schema.
	Message(ValueTree),
}

impl Value {
	/// Stable name of the variant, for diagnostics.
	pub const fn kind_name(&self) -> &'static str {
		match self {
			Value::Bool(_) => "bool",
			Value::Uint(_) => "uint",
			Value::Int(_) => "int",
			Value::Float(_) => "float",
			Value::Double(_) => "double",
			Value::Bytes(_) => "bytes",
			Value::Text(_) => "text",
			Value::Message(_) => "message",
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_uint(&self) -> Option<u64> {
		match self {
			Value::Uint(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_float(&self) -> Option<f32> {
		match self {
			Value::Float(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_double(&self) -> Option<f64> {
		match self {
			Value::Double(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Value::Bytes(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Value::Text(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_message(&self) -> Option<&ValueTree> {
		match self {
			Value::Message(v) => Some(v),
			_ => None,
		}
	}
}

/// What a populated tag holds: one value, or an ordered list for repeated fields.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldValue {
	Single(Value),
	Repeated(Vec<Value>),
}

/// Raw payload of an unrecognized wire field, kept when the decoder is
/// configured to preserve unknowns instead of discarding them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UnknownValue {
	Varint(u64),
	Fixed32(u32),
	Fixed64(u64),
	LengthDelimited(Vec<u8>),
}

/// An unrecognized field captured from the wire.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnknownField {
	pub tag: u32,
	pub wire_type: WireType,
	pub value: UnknownValue,
}

/// In-memory form of one message instance: a mapping from field tag to value.
///
/// Equality covers both recognized fields and the unknown-field side-table.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueTree {
	fields: BTreeMap<u32, FieldValue>,
	#[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
	unknown: Vec<UnknownField>,
}

impl ValueTree {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set a singular value, replacing any prior value for the tag.
	pub fn set(&mut self, tag: u32, value: Value) {
		self.fields.insert(tag, FieldValue::Single(value));
	}

	/// Append to a repeated field, creating it if absent.
	///
	/// The slot is treated as repeated from then on; a prior singular value
	/// for the tag is discarded.
	pub fn push(&mut self, tag: u32, value: Value) {
		match self.fields.entry(tag) {
			Entry::Vacant(slot) => {
				slot.insert(FieldValue::Repeated(vec![value]));
			}
			Entry::Occupied(mut slot) => match slot.get_mut() {
				FieldValue::Repeated(items) => items.push(value),
				FieldValue::Single(_) => {
					slot.insert(FieldValue::Repeated(vec![value]));
				}
			},
		}
	}

	/// Remove a tag, returning what it held.
	pub fn remove(&mut self, tag: u32) -> Option<FieldValue> {
		self.fields.remove(&tag)
	}

	pub fn contains(&self, tag: u32) -> bool {
		self.fields.contains_key(&tag)
	}

	pub fn get(&self, tag: u32) -> Option<&FieldValue> {
		self.fields.get(&tag)
	}

	/// The singular value for a tag, if present and singular.
	pub fn value(&self, tag: u32) -> Option<&Value> {
		match self.fields.get(&tag) {
			Some(FieldValue::Single(value)) => Some(value),
			_ => None,
		}
	}

	/// The list for a repeated tag, if present and repeated.
	pub fn repeated(&self, tag: u32) -> Option<&[Value]> {
		match self.fields.get(&tag) {
			Some(FieldValue::Repeated(items)) => Some(items),
			_ => None,
		}
	}

	pub fn uint(&self, tag: u32) -> Option<u64> {
		self.value(tag).and_then(Value::as_uint)
	}

	pub fn int(&self, tag: u32) -> Option<i64> {
		self.value(tag).and_then(Value::as_int)
	}

	pub fn bool(&self, tag: u32) -> Option<bool> {
		self.value(tag).and_then(Value::as_bool)
	}

	pub fn bytes(&self, tag: u32) -> Option<&[u8]> {
		self.value(tag).and_then(Value::as_bytes)
	}

	pub fn text(&self, tag: u32) -> Option<&str> {
		self.value(tag).and_then(Value::as_text)
	}

	pub fn message(&self, tag: u32) -> Option<&ValueTree> {
		self.value(tag).and_then(Value::as_message)
	}

	/// Populated tags and their values, in ascending tag order.
	pub fn iter(&self) -> impl Iterator<Item = (u32, &FieldValue)> {
		self.fields.iter().map(|(tag, value)| (*tag, value))
	}

	/// Populated tags in ascending order.
	pub fn tags(&self) -> impl Iterator<Item = u32> + '_ {
		self.fields.keys().copied()
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Record an unrecognized wire field in the side-table.
	pub fn push_unknown(&mut self, field: UnknownField) {
		self.unknown.push(field);
	}

	/// Unrecognized wire fields, in the order they appeared.
	pub fn unknown_fields(&self) -> &[UnknownField] {
		&self.unknown
	}
}

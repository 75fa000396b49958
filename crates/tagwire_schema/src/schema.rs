#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use thiserror::Error;

use crate::value::Value;

/// Stable identifier of a message schema within a registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SchemaName(String);

impl SchemaName {
	/// Create a non-empty `SchemaName`.
	pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
		let name = name.into();
		if name.trim().is_empty() {
			return Err(SchemaError::EmptyName);
		}
		Ok(Self(name))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for SchemaName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for SchemaName {
	type Err = SchemaError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		SchemaName::new(s)
	}
}

impl core::borrow::Borrow<str> for SchemaName {
	fn borrow(&self) -> &str {
		&self.0
	}
}

/// Errors raised while constructing schemas or a registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
	#[error("schema name must be non-empty")]
	EmptyName,

	#[error("field tag must be nonzero: schema={schema} field={field}")]
	ZeroTag {
		schema: SchemaName,
		field: String,
	},

	#[error("duplicate field tag: schema={schema} tag={tag}")]
	DuplicateTag {
		schema: SchemaName,
		tag: u32,
	},

	#[error("default value does not fit the field: schema={schema} tag={tag}")]
	InvalidDefault {
		schema: SchemaName,
		tag: u32,
	},

	#[error("duplicate schema name: {name}")]
	DuplicateSchema {
		name: SchemaName,
	},

	#[error("unresolved schema reference: schema={schema} tag={tag} references={reference}")]
	UnresolvedReference {
		schema: SchemaName,
		tag: u32,
		reference: SchemaName,
	},
}

/// The four low-level wire encodings a field's bytes are framed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WireType {
	Varint,
	Fixed64,
	LengthDelimited,
	Fixed32,
}

impl WireType {
	/// The 3-bit code carried in a tag header.
	pub const fn code(self) -> u8 {
		match self {
			WireType::Varint => 0,
			WireType::Fixed64 => 1,
			WireType::LengthDelimited => 2,
			WireType::Fixed32 => 5,
		}
	}

	/// Map a tag-header code back to a wire type. Codes 3 and 4 are reserved.
	pub const fn from_code(code: u8) -> Option<Self> {
		match code {
			0 => Some(WireType::Varint),
			1 => Some(WireType::Fixed64),
			2 => Some(WireType::LengthDelimited),
			5 => Some(WireType::Fixed32),
			_ => None,
		}
	}

	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			WireType::Varint => "varint",
			WireType::Fixed64 => "fixed64",
			WireType::LengthDelimited => "length_delimited",
			WireType::Fixed32 => "fixed32",
		}
	}
}

impl fmt::Display for WireType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Semantic type of a scalar field.
///
/// The split between plain, signed (zigzag) and fixed integer kinds mirrors
/// the integer-encoding annotations carried by the message catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScalarKind {
	Bool,
	Uint32,
	Uint64,
	Int32,
	Int64,
	Sint32,
	Sint64,
	Fixed32,
	Fixed64,
	Sfixed32,
	Sfixed64,
	Float,
	Double,
	Bytes,
	Text,
}

impl ScalarKind {
	/// The wire type this kind is framed with.
	pub const fn wire_type(self) -> WireType {
		match self {
			ScalarKind::Bool
			| ScalarKind::Uint32
			| ScalarKind::Uint64
			| ScalarKind::Int32
			| ScalarKind::Int64
			| ScalarKind::Sint32
			| ScalarKind::Sint64 => WireType::Varint,
			ScalarKind::Fixed32 | ScalarKind::Sfixed32 | ScalarKind::Float => WireType::Fixed32,
			ScalarKind::Fixed64 | ScalarKind::Sfixed64 | ScalarKind::Double => WireType::Fixed64,
			ScalarKind::Bytes | ScalarKind::Text => WireType::LengthDelimited,
		}
	}

	/// Whether varint encoding goes through the zigzag transform first.
	pub const fn uses_zigzag(self) -> bool {
		matches!(self, ScalarKind::Sint32 | ScalarKind::Sint64)
	}

	/// Whether `value`'s variant is the one this kind encodes.
	pub fn matches_variant(self, value: &Value) -> bool {
		match self {
			ScalarKind::Bool => matches!(value, Value::Bool(_)),
			ScalarKind::Uint32 | ScalarKind::Uint64 | ScalarKind::Fixed32 | ScalarKind::Fixed64 => {
				matches!(value, Value::Uint(_))
			}
			ScalarKind::Int32
			| ScalarKind::Int64
			| ScalarKind::Sint32
			| ScalarKind::Sint64
			| ScalarKind::Sfixed32
			| ScalarKind::Sfixed64 => matches!(value, Value::Int(_)),
			ScalarKind::Float => matches!(value, Value::Float(_)),
			ScalarKind::Double => matches!(value, Value::Double(_)),
			ScalarKind::Bytes => matches!(value, Value::Bytes(_)),
			ScalarKind::Text => matches!(value, Value::Text(_)),
		}
	}

	/// Whether `value` matches this kind, including 32-bit range checks.
	pub fn accepts(self, value: &Value) -> bool {
		if !self.matches_variant(value) {
			return false;
		}
		match (self, value) {
			(ScalarKind::Uint32 | ScalarKind::Fixed32, Value::Uint(v)) => *v <= u64::from(u32::MAX),
			(ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32, Value::Int(v)) => {
				i32::try_from(*v).is_ok()
			}
			_ => true,
		}
	}

	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			ScalarKind::Bool => "bool",
			ScalarKind::Uint32 => "uint32",
			ScalarKind::Uint64 => "uint64",
			ScalarKind::Int32 => "int32",
			ScalarKind::Int64 => "int64",
			ScalarKind::Sint32 => "sint32",
			ScalarKind::Sint64 => "sint64",
			ScalarKind::Fixed32 => "fixed32",
			ScalarKind::Fixed64 => "fixed64",
			ScalarKind::Sfixed32 => "sfixed32",
			ScalarKind::Sfixed64 => "sfixed64",
			ScalarKind::Float => "float",
			ScalarKind::Double => "double",
			ScalarKind::Bytes => "bytes",
			ScalarKind::Text => "text",
		}
	}
}

impl fmt::Display for ScalarKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What a field holds: a scalar, or a nested message governed by another schema.
///
/// Nested schemas are referenced by registry name, which lets a schema
/// reference itself or its ancestors without creating ownership cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldKind {
	Scalar(ScalarKind),
	Message(SchemaName),
}

impl FieldKind {
	/// The wire type this kind is framed with.
	pub const fn wire_type(&self) -> WireType {
		match self {
			FieldKind::Scalar(kind) => kind.wire_type(),
			FieldKind::Message(_) => WireType::LengthDelimited,
		}
	}
}

/// Field multiplicity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Cardinality {
	/// Singular; absent means absent.
	Optional,
	/// Singular with a declared default, materialized when absent on decode.
	Defaulted(Value),
	/// Ordered homogeneous list; wire order is preserved.
	Repeated,
}

/// Static description of one field within a message schema.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDescriptor {
	tag: u32,
	name: String,
	kind: FieldKind,
	cardinality: Cardinality,
}

impl FieldDescriptor {
	/// An optional scalar field.
	pub fn scalar(tag: u32, name: impl Into<String>, kind: ScalarKind) -> Self {
		Self {
			tag,
			name: name.into(),
			kind: FieldKind::Scalar(kind),
			cardinality: Cardinality::Optional,
		}
	}

	/// An optional nested-message field governed by the named schema.
	pub fn message(tag: u32, name: impl Into<String>, schema: SchemaName) -> Self {
		Self {
			tag,
			name: name.into(),
			kind: FieldKind::Message(schema),
			cardinality: Cardinality::Optional,
		}
	}

	/// Make the field repeated. Replaces any declared default.
	pub fn repeated(mut self) -> Self {
		self.cardinality = Cardinality::Repeated;
		self
	}

	/// Declare a default value, materialized when the field is absent on decode.
	pub fn with_default(mut self, default: Value) -> Self {
		self.cardinality = Cardinality::Defaulted(default);
		self
	}

	pub fn tag(&self) -> u32 {
		self.tag
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> &FieldKind {
		&self.kind
	}

	pub fn cardinality(&self) -> &Cardinality {
		&self.cardinality
	}

	/// The wire type instances of this field are framed with.
	pub fn wire_type(&self) -> WireType {
		self.kind.wire_type()
	}

	pub fn is_repeated(&self) -> bool {
		matches!(self.cardinality, Cardinality::Repeated)
	}

	/// The declared default, if the field carries one.
	pub fn default_value(&self) -> Option<&Value> {
		match &self.cardinality {
			Cardinality::Defaulted(value) => Some(value),
			_ => None,
		}
	}
}

/// One message type: a set of field descriptors keyed by tag.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageSchema {
	name: SchemaName,
	fields: BTreeMap<u32, FieldDescriptor>,
}

impl MessageSchema {
	/// Start building a schema with the given name.
	pub fn builder(name: SchemaName) -> MessageSchemaBuilder {
		MessageSchemaBuilder {
			name,
			fields: Vec::new(),
		}
	}

	pub fn name(&self) -> &SchemaName {
		&self.name
	}

	/// Look up a descriptor by tag.
	pub fn field_by_tag(&self, tag: u32) -> Option<&FieldDescriptor> {
		self.fields.get(&tag)
	}

	/// All descriptors in ascending tag order.
	pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
		self.fields.values()
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

/// Builder for [`MessageSchema`]; invariants are checked in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct MessageSchemaBuilder {
	name: SchemaName,
	fields: Vec<FieldDescriptor>,
}

impl MessageSchemaBuilder {
	/// Add a field descriptor.
	pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
		self.fields.push(descriptor);
		self
	}

	/// Validate tags and defaults, producing an immutable schema.
	pub fn build(self) -> Result<MessageSchema, SchemaError> {
		let mut fields = BTreeMap::new();
		for descriptor in self.fields {
			if descriptor.tag == 0 {
				return Err(SchemaError::ZeroTag {
					schema: self.name,
					field: descriptor.name,
				});
			}

			if let Cardinality::Defaulted(default) = &descriptor.cardinality {
				let ok = match &descriptor.kind {
					FieldKind::Scalar(kind) => kind.accepts(default),
					FieldKind::Message(_) => false,
				};
				if !ok {
					return Err(SchemaError::InvalidDefault {
						schema: self.name,
						tag: descriptor.tag,
					});
				}
			}

			let tag = descriptor.tag;
			if fields.insert(tag, descriptor).is_some() {
				return Err(SchemaError::DuplicateTag {
					schema: self.name,
					tag,
				});
			}
		}

		Ok(MessageSchema {
			name: self.name,
			fields,
		})
	}
}

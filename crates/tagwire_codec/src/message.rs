#![forbid(unsafe_code)]

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tracing::trace;

use tagwire_schema::{
	Cardinality, FieldDescriptor, FieldKind, FieldValue, MessageSchema, ScalarKind, SchemaName, SchemaRegistry,
	UnknownField, UnknownValue, Value, ValueTree, WireType,
};

use crate::wire::{
	WireError, put_fixed32, put_fixed64, put_length_delimited, put_tag, put_varint, read_fixed32, read_fixed64,
	read_length_delimited, read_tag_header, read_varint, zigzag_decode, zigzag_encode,
};

/// Default nesting depth guard for decode.
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

/// Policy for wire fields whose tag the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UnknownFieldPolicy {
	/// Skip the field's bytes and drop them.
	#[default]
	Discard,
	/// Keep the raw payload in the tree's unknown-field side-table.
	/// Preserved fields are never re-emitted by the encoder.
	Preserve,
}

/// Encode-side policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EncodeOptions {
	/// Omit singular-with-default fields whose value equals the declared
	/// default. Affects round-trip byte-identity, not decoded equality.
	pub omit_default_values: bool,
}

impl Default for EncodeOptions {
	fn default() -> Self {
		Self {
			omit_default_values: true,
		}
	}
}

/// Decode-side policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecodeOptions {
	pub unknown_fields: UnknownFieldPolicy,
	/// Maximum nested-message depth before decode fails.
	pub recursion_limit: u32,
}

impl Default for DecodeOptions {
	fn default() -> Self {
		Self {
			unknown_fields: UnknownFieldPolicy::default(),
			recursion_limit: DEFAULT_RECURSION_LIMIT,
		}
	}
}

/// Errors raised while encoding a value tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
	#[error("tree populates an undeclared tag: schema={schema} tag={tag}")]
	UnknownField {
		schema: SchemaName,
		tag: u32,
	},

	#[error("value does not match the field type: schema={schema} tag={tag} expected={expected} found={found}")]
	TypeMismatch {
		schema: SchemaName,
		tag: u32,
		expected: &'static str,
		found: &'static str,
	},

	#[error("singular/repeated shape does not match the field: schema={schema} tag={tag}")]
	CardinalityMismatch {
		schema: SchemaName,
		tag: u32,
	},

	#[error("value out of range for 32-bit field: schema={schema} tag={tag}")]
	ValueOutOfRange {
		schema: SchemaName,
		tag: u32,
	},

	#[error("unresolved nested schema: {name}")]
	UnresolvedSchema {
		name: SchemaName,
	},
}

/// Errors raised while decoding a byte buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("truncated input: need={need} have={have}")]
	TruncatedInput {
		need: usize,
		have: usize,
	},

	#[error("varint continuation runs past 10 bytes")]
	VarintOverflow,

	#[error("reserved wire type code: {code}")]
	MalformedWireType {
		code: u8,
	},

	#[error("invalid field tag on wire: {tag}")]
	InvalidTag {
		tag: u64,
	},

	#[error("wire type does not match the declared field: tag={tag} declared={declared} actual={actual}")]
	WireTypeMismatch {
		tag: u32,
		declared: WireType,
		actual: WireType,
	},

	#[error("invalid UTF-8 in text field: tag={tag}")]
	InvalidUtf8 {
		tag: u32,
	},

	#[error("unresolved nested schema: {name}")]
	UnresolvedSchema {
		name: SchemaName,
	},

	#[error("message nesting deeper than {limit}")]
	RecursionLimitExceeded {
		limit: u32,
	},
}

impl From<WireError> for DecodeError {
	fn from(err: WireError) -> Self {
		match err {
			WireError::TruncatedInput { need, have } => DecodeError::TruncatedInput { need, have },
			WireError::VarintOverflow => DecodeError::VarintOverflow,
		}
	}
}

/// Encode a value tree against its schema.
///
/// Fields are emitted in ascending tag order for deterministic output; wire
/// order is not semantically significant to decoders. The result carries no
/// outer envelope — transport framing is the caller's concern.
pub fn encode_message(
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	tree: &ValueTree,
	options: &EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
	let mut buf = Vec::new();
	encode_fields(registry, schema, tree, options, &mut buf)?;
	Ok(buf)
}

/// Encode with default options.
pub fn encode_message_default(
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	tree: &ValueTree,
) -> Result<Vec<u8>, EncodeError> {
	encode_message(registry, schema, tree, &EncodeOptions::default())
}

/// Append an encoded message into the provided buffer.
pub fn encode_message_into(
	buf: &mut BytesMut,
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	tree: &ValueTree,
	options: &EncodeOptions,
) -> Result<(), EncodeError> {
	encode_fields(registry, schema, tree, options, buf)
}

fn encode_fields(
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	tree: &ValueTree,
	options: &EncodeOptions,
	buf: &mut impl BufMut,
) -> Result<(), EncodeError> {
	for (tag, field_value) in tree.iter() {
		let Some(descriptor) = schema.field_by_tag(tag) else {
			return Err(EncodeError::UnknownField {
				schema: schema.name().clone(),
				tag,
			});
		};

		match (field_value, descriptor.cardinality()) {
			(FieldValue::Repeated(items), Cardinality::Repeated) => {
				for item in items {
					encode_entry(registry, schema, descriptor, item, options, buf)?;
				}
			}
			(FieldValue::Single(value), Cardinality::Optional) => {
				encode_entry(registry, schema, descriptor, value, options, buf)?;
			}
			(FieldValue::Single(value), Cardinality::Defaulted(default)) => {
				if options.omit_default_values && value == default {
					continue;
				}
				encode_entry(registry, schema, descriptor, value, options, buf)?;
			}
			_ => {
				return Err(EncodeError::CardinalityMismatch {
					schema: schema.name().clone(),
					tag,
				});
			}
		}
	}
	Ok(())
}

fn encode_entry(
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	descriptor: &FieldDescriptor,
	value: &Value,
	options: &EncodeOptions,
	buf: &mut impl BufMut,
) -> Result<(), EncodeError> {
	let tag = descriptor.tag();
	match descriptor.kind() {
		FieldKind::Scalar(kind) => {
			if !kind.matches_variant(value) {
				return Err(EncodeError::TypeMismatch {
					schema: schema.name().clone(),
					tag,
					expected: kind.as_str(),
					found: value.kind_name(),
				});
			}
			if !kind.accepts(value) {
				return Err(EncodeError::ValueOutOfRange {
					schema: schema.name().clone(),
					tag,
				});
			}
			put_tag(buf, tag, kind.wire_type());
			encode_scalar(*kind, value, buf);
		}
		FieldKind::Message(reference) => {
			let Value::Message(subtree) = value else {
				return Err(EncodeError::TypeMismatch {
					schema: schema.name().clone(),
					tag,
					expected: "message",
					found: value.kind_name(),
				});
			};
			let Some(nested) = registry.get(reference.as_str()) else {
				return Err(EncodeError::UnresolvedSchema {
					name: reference.clone(),
				});
			};
			let mut nested_buf = Vec::new();
			encode_fields(registry, nested, subtree, options, &mut nested_buf)?;
			put_tag(buf, tag, WireType::LengthDelimited);
			put_length_delimited(buf, &nested_buf);
		}
	}
	Ok(())
}

fn encode_scalar(kind: ScalarKind, value: &Value, buf: &mut impl BufMut) {
	match (kind, value) {
		(ScalarKind::Bool, Value::Bool(v)) => put_varint(buf, u64::from(*v)),
		(ScalarKind::Uint32 | ScalarKind::Uint64, Value::Uint(v)) => put_varint(buf, *v),
		(ScalarKind::Int32 | ScalarKind::Int64, Value::Int(v)) => put_varint(buf, *v as u64),
		(ScalarKind::Sint32 | ScalarKind::Sint64, Value::Int(v)) => put_varint(buf, zigzag_encode(*v)),
		(ScalarKind::Fixed32, Value::Uint(v)) => put_fixed32(buf, *v as u32),
		(ScalarKind::Fixed64, Value::Uint(v)) => put_fixed64(buf, *v),
		(ScalarKind::Sfixed32, Value::Int(v)) => put_fixed32(buf, *v as i32 as u32),
		(ScalarKind::Sfixed64, Value::Int(v)) => put_fixed64(buf, *v as u64),
		(ScalarKind::Float, Value::Float(v)) => put_fixed32(buf, v.to_bits()),
		(ScalarKind::Double, Value::Double(v)) => put_fixed64(buf, v.to_bits()),
		(ScalarKind::Bytes, Value::Bytes(v)) => put_length_delimited(buf, v),
		(ScalarKind::Text, Value::Text(v)) => put_length_delimited(buf, v.as_bytes()),
		// encode_entry checks matches_variant before calling here.
		_ => unreachable!("scalar kind/value pairing validated by caller"),
	}
}

/// Decode a byte buffer into a value tree governed by `schema`.
///
/// Unknown tags are tolerated per the configured policy; only malformed
/// structure is an error. Absent singular-with-default fields are
/// materialized with their declared default before the tree is returned.
pub fn decode_message(
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	bytes: &[u8],
	options: &DecodeOptions,
) -> Result<ValueTree, DecodeError> {
	decode_fields(registry, schema, bytes, options, 0)
}

/// Decode with default options.
pub fn decode_message_default(
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	bytes: &[u8],
) -> Result<ValueTree, DecodeError> {
	decode_message(registry, schema, bytes, &DecodeOptions::default())
}

fn decode_fields(
	registry: &SchemaRegistry,
	schema: &MessageSchema,
	bytes: &[u8],
	options: &DecodeOptions,
	depth: u32,
) -> Result<ValueTree, DecodeError> {
	if depth >= options.recursion_limit {
		return Err(DecodeError::RecursionLimitExceeded {
			limit: options.recursion_limit,
		});
	}

	let mut input = bytes;
	let mut tree = ValueTree::new();

	// The loop is either at a tag boundary or done with the buffer exhausted
	// exactly at one; running out mid-payload surfaces as TruncatedInput.
	while !input.is_empty() {
		let (raw_tag, code) = read_tag_header(&mut input)?;
		let Some(actual) = WireType::from_code(code) else {
			return Err(DecodeError::MalformedWireType { code });
		};
		if raw_tag == 0 || raw_tag > u64::from(u32::MAX) {
			return Err(DecodeError::InvalidTag { tag: raw_tag });
		}
		let tag = raw_tag as u32;

		match schema.field_by_tag(tag) {
			Some(descriptor) => {
				decode_field(registry, descriptor, actual, &mut input, &mut tree, options, depth)?;
			}
			None => decode_unknown(schema, tag, actual, &mut input, &mut tree, options)?,
		}
	}

	for descriptor in schema.fields() {
		if let Some(default) = descriptor.default_value() {
			if !tree.contains(descriptor.tag()) {
				tree.set(descriptor.tag(), default.clone());
			}
		}
	}

	Ok(tree)
}

fn decode_field(
	registry: &SchemaRegistry,
	descriptor: &FieldDescriptor,
	actual: WireType,
	input: &mut &[u8],
	tree: &mut ValueTree,
	options: &DecodeOptions,
	depth: u32,
) -> Result<(), DecodeError> {
	let tag = descriptor.tag();
	match descriptor.kind() {
		FieldKind::Scalar(kind) => {
			let declared = kind.wire_type();
			if actual == declared {
				let value = decode_scalar(*kind, tag, input)?;
				store(tree, descriptor, value);
			} else if actual == WireType::LengthDelimited
				&& descriptor.is_repeated()
				&& declared != WireType::LengthDelimited
			{
				// Packed run: concatenated element encodings in one
				// length-delimited payload. The encoder here always emits
				// unpacked; producers in the wild send both.
				let mut run = read_length_delimited(input)?;
				while !run.is_empty() {
					let value = decode_scalar(*kind, tag, &mut run)?;
					tree.push(tag, value);
				}
			} else {
				return Err(DecodeError::WireTypeMismatch { tag, declared, actual });
			}
		}
		FieldKind::Message(reference) => {
			if actual != WireType::LengthDelimited {
				return Err(DecodeError::WireTypeMismatch {
					tag,
					declared: WireType::LengthDelimited,
					actual,
				});
			}
			let payload = read_length_delimited(input)?;
			let Some(nested) = registry.get(reference.as_str()) else {
				return Err(DecodeError::UnresolvedSchema {
					name: reference.clone(),
				});
			};
			let subtree = decode_fields(registry, nested, payload, options, depth + 1)?;
			store(tree, descriptor, Value::Message(subtree));
		}
	}
	Ok(())
}

fn decode_unknown(
	schema: &MessageSchema,
	tag: u32,
	wire_type: WireType,
	input: &mut &[u8],
	tree: &mut ValueTree,
	options: &DecodeOptions,
) -> Result<(), DecodeError> {
	match options.unknown_fields {
		UnknownFieldPolicy::Discard => {
			skip_payload(wire_type, input)?;
			trace!(schema = %schema.name(), tag, wire_type = %wire_type, "skipping unknown field");
		}
		UnknownFieldPolicy::Preserve => {
			let value = match wire_type {
				WireType::Varint => UnknownValue::Varint(read_varint(input)?),
				WireType::Fixed32 => UnknownValue::Fixed32(read_fixed32(input)?),
				WireType::Fixed64 => UnknownValue::Fixed64(read_fixed64(input)?),
				WireType::LengthDelimited => UnknownValue::LengthDelimited(read_length_delimited(input)?.to_vec()),
			};
			trace!(schema = %schema.name(), tag, wire_type = %wire_type, "preserving unknown field");
			tree.push_unknown(UnknownField { tag, wire_type, value });
		}
	}
	Ok(())
}

fn skip_payload(wire_type: WireType, input: &mut &[u8]) -> Result<(), DecodeError> {
	match wire_type {
		WireType::Varint => {
			read_varint(input)?;
		}
		WireType::Fixed32 => {
			read_fixed32(input)?;
		}
		WireType::Fixed64 => {
			read_fixed64(input)?;
		}
		WireType::LengthDelimited => {
			read_length_delimited(input)?;
		}
	}
	Ok(())
}

fn store(tree: &mut ValueTree, descriptor: &FieldDescriptor, value: Value) {
	if descriptor.is_repeated() {
		tree.push(descriptor.tag(), value);
	} else {
		// Last one wins when a singular tag repeats on the wire.
		tree.set(descriptor.tag(), value);
	}
}

fn decode_scalar(kind: ScalarKind, tag: u32, input: &mut &[u8]) -> Result<Value, DecodeError> {
	Ok(match kind {
		ScalarKind::Bool => Value::Bool(read_varint(input)? != 0),
		ScalarKind::Uint32 => Value::Uint(u64::from(read_varint(input)? as u32)),
		ScalarKind::Uint64 => Value::Uint(read_varint(input)?),
		ScalarKind::Int32 => Value::Int(i64::from(read_varint(input)? as i32)),
		ScalarKind::Int64 => Value::Int(read_varint(input)? as i64),
		ScalarKind::Sint32 => Value::Int(i64::from(zigzag_decode(read_varint(input)?) as i32)),
		ScalarKind::Sint64 => Value::Int(zigzag_decode(read_varint(input)?)),
		ScalarKind::Fixed32 => Value::Uint(u64::from(read_fixed32(input)?)),
		ScalarKind::Fixed64 => Value::Uint(read_fixed64(input)?),
		ScalarKind::Sfixed32 => Value::Int(i64::from(read_fixed32(input)? as i32)),
		ScalarKind::Sfixed64 => Value::Int(read_fixed64(input)? as i64),
		ScalarKind::Float => Value::Float(f32::from_bits(read_fixed32(input)?)),
		ScalarKind::Double => Value::Double(f64::from_bits(read_fixed64(input)?)),
		ScalarKind::Bytes => Value::Bytes(read_length_delimited(input)?.to_vec()),
		ScalarKind::Text => {
			let payload = read_length_delimited(input)?;
			match core::str::from_utf8(payload) {
				Ok(text) => Value::Text(text.to_owned()),
				Err(_) => return Err(DecodeError::InvalidUtf8 { tag }),
			}
		}
	})
}

#![forbid(unsafe_code)]

pub mod registry;
pub mod schema;
pub mod value;

pub use registry::{SchemaRegistry, SchemaRegistryBuilder};
pub use schema::{
	Cardinality, FieldDescriptor, FieldKind, MessageSchema, MessageSchemaBuilder, ScalarKind, SchemaError, SchemaName,
	WireType,
};
pub use value::{FieldValue, UnknownField, UnknownValue, Value, ValueTree};

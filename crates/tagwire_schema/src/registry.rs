#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::{FieldKind, MessageSchema, SchemaError, SchemaName};

/// Immutable set of message schemas keyed by name.
///
/// Built once at startup and shared read-only across concurrent encode and
/// decode calls; nested-schema references are resolved against it.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
	schemas: BTreeMap<SchemaName, Arc<MessageSchema>>,
}

impl SchemaRegistry {
	/// Start building a registry.
	pub fn builder() -> SchemaRegistryBuilder {
		SchemaRegistryBuilder { schemas: Vec::new() }
	}

	/// Look up a schema by name.
	pub fn get(&self, name: &str) -> Option<&Arc<MessageSchema>> {
		self.schemas.get(name)
	}

	/// All registered schemas in name order.
	pub fn schemas(&self) -> impl Iterator<Item = &Arc<MessageSchema>> {
		self.schemas.values()
	}

	pub fn len(&self) -> usize {
		self.schemas.len()
	}

	pub fn is_empty(&self) -> bool {
		self.schemas.is_empty()
	}
}

/// Builder for [`SchemaRegistry`]; cross-references are checked in
/// [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistryBuilder {
	schemas: Vec<MessageSchema>,
}

impl SchemaRegistryBuilder {
	/// Add a schema.
	pub fn register(mut self, schema: MessageSchema) -> Self {
		self.schemas.push(schema);
		self
	}

	/// Validate name uniqueness and nested-schema references, producing an
	/// immutable registry.
	pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
		let mut schemas: BTreeMap<SchemaName, Arc<MessageSchema>> = BTreeMap::new();
		for schema in self.schemas {
			let name = schema.name().clone();
			if schemas.insert(name.clone(), Arc::new(schema)).is_some() {
				return Err(SchemaError::DuplicateSchema { name });
			}
		}

		for schema in schemas.values() {
			for field in schema.fields() {
				if let FieldKind::Message(reference) = field.kind() {
					if !schemas.contains_key(reference) {
						return Err(SchemaError::UnresolvedReference {
							schema: schema.name().clone(),
							tag: field.tag(),
							reference: reference.clone(),
						});
					}
				}
			}
		}

		Ok(SchemaRegistry { schemas })
	}
}

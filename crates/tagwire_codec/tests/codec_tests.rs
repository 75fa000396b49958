use tagwire_codec::{
	DecodeError, DecodeOptions, UnknownFieldPolicy, decode_message, decode_message_default, encode_message_default,
};
use tagwire_schema::{
	FieldDescriptor, MessageSchema, ScalarKind, SchemaName, SchemaRegistry, Value, ValueTree,
};

fn name(s: &str) -> SchemaName {
	SchemaName::new(s).expect("schema name")
}

/// A cut-down slice of an IM catalog: a transport message whose body is a
/// list of elements, each optionally carrying styling attributes.
fn im_registry() -> SchemaRegistry {
	let head = MessageSchema::builder(name("MsgHead"))
		.field(FieldDescriptor::scalar(1, "from_uin", ScalarKind::Uint64))
		.field(FieldDescriptor::scalar(2, "to_uin", ScalarKind::Uint64))
		.field(FieldDescriptor::scalar(5, "msg_seq", ScalarKind::Uint32).with_default(Value::Uint(0)))
		.field(FieldDescriptor::scalar(6, "msg_time", ScalarKind::Fixed32))
		.field(FieldDescriptor::scalar(18, "locale_id", ScalarKind::Uint32).with_default(Value::Uint(2052)))
		.build()
		.expect("MsgHead");

	let attr = MessageSchema::builder(name("ElemAttr"))
		.field(FieldDescriptor::scalar(1, "color", ScalarKind::Uint32).with_default(Value::Uint(0)))
		.field(FieldDescriptor::scalar(2, "bold", ScalarKind::Bool).with_default(Value::Bool(false)))
		.build()
		.expect("ElemAttr");

	let elem = MessageSchema::builder(name("Elem"))
		.field(FieldDescriptor::scalar(1, "text", ScalarKind::Text).with_default(Value::Text(String::new())))
		.field(FieldDescriptor::message(2, "attr", name("ElemAttr")))
		.build()
		.expect("Elem");

	let body = MessageSchema::builder(name("RichText"))
		.field(FieldDescriptor::message(1, "elems", name("Elem")).repeated())
		.build()
		.expect("RichText");

	let trans = MessageSchema::builder(name("TransMsg"))
		.field(FieldDescriptor::message(1, "head", name("MsgHead")))
		.field(FieldDescriptor::message(2, "body", name("RichText")))
		.field(FieldDescriptor::scalar(3, "random", ScalarKind::Sint32))
		.build()
		.expect("TransMsg");

	SchemaRegistry::builder()
		.register(head)
		.register(attr)
		.register(elem)
		.register(body)
		.register(trans)
		.build()
		.expect("registry")
}

fn elem(text: &str, bold: Option<bool>) -> ValueTree {
	let mut tree = ValueTree::new();
	tree.set(1, Value::Text(text.to_string()));
	if let Some(bold) = bold {
		let mut attr = ValueTree::new();
		attr.set(2, Value::Bool(bold));
		tree.set(2, Value::Message(attr));
	}
	tree
}

#[test]
fn two_level_nested_roundtrip_preserves_order() {
	let registry = im_registry();
	let schema = registry.get("TransMsg").expect("TransMsg");

	let mut head = ValueTree::new();
	head.set(1, Value::Uint(123_456_789));
	head.set(2, Value::Uint(987_654_321));
	head.set(6, Value::Uint(1_700_000_000));

	let mut body = ValueTree::new();
	for e in [elem("hello", Some(true)), elem(" ", None), elem("world", Some(false))] {
		body.push(1, Value::Message(e));
	}

	let mut msg = ValueTree::new();
	msg.set(1, Value::Message(head));
	msg.set(2, Value::Message(body));
	msg.set(3, Value::Int(-77));

	let encoded = encode_message_default(&registry, schema, &msg).expect("encode");
	let decoded = decode_message_default(&registry, schema, &encoded).expect("decode");

	let head = decoded.message(1).expect("head");
	assert_eq!(head.uint(1), Some(123_456_789));
	assert_eq!(head.uint(2), Some(987_654_321));
	assert_eq!(head.uint(6), Some(1_700_000_000));
	assert_eq!(decoded.int(3), Some(-77));

	let elems = decoded.message(2).expect("body").repeated(1).expect("elems");
	let texts: Vec<&str> = elems
		.iter()
		.filter_map(Value::as_message)
		.filter_map(|e| e.text(1))
		.collect();
	assert_eq!(texts, vec!["hello", " ", "world"]);

	// Nested optional sub-records: present where set, absent where not.
	let attrs: Vec<Option<bool>> = elems
		.iter()
		.filter_map(Value::as_message)
		.map(|e| e.message(2).and_then(|a| a.bool(2)))
		.collect();
	assert_eq!(attrs, vec![Some(true), None, Some(false)]);
}

#[test]
fn absent_defaults_materialize_through_nesting() {
	let registry = im_registry();
	let schema = registry.get("TransMsg").expect("TransMsg");

	let mut msg = ValueTree::new();
	msg.set(1, Value::Message(ValueTree::new()));

	let encoded = encode_message_default(&registry, schema, &msg).expect("encode");
	let decoded = decode_message_default(&registry, schema, &encoded).expect("decode");

	// The nested head comes back with its declared defaults, including the
	// non-zero locale id.
	let head = decoded.message(1).expect("head");
	assert_eq!(head.uint(5), Some(0));
	assert_eq!(head.uint(18), Some(2052));
	// Optional fields without defaults stay absent.
	assert_eq!(head.uint(1), None);
	assert!(!decoded.contains(2));
}

#[test]
fn decode_after_reencode_is_stable() {
	let registry = im_registry();
	let schema = registry.get("TransMsg").expect("TransMsg");

	let mut msg = ValueTree::new();
	let mut head = ValueTree::new();
	head.set(1, Value::Uint(7));
	head.set(18, Value::Uint(1033));
	msg.set(1, Value::Message(head));
	msg.set(3, Value::Int(5));

	let once = decode_message_default(
		&registry,
		schema,
		&encode_message_default(&registry, schema, &msg).expect("encode"),
	)
	.expect("decode");
	let twice = decode_message_default(
		&registry,
		schema,
		&encode_message_default(&registry, schema, &once).expect("re-encode"),
	)
	.expect("re-decode");

	assert_eq!(once, twice);
	assert_eq!(twice.message(1).expect("head").uint(18), Some(1033));
}

#[test]
fn newer_producer_fields_are_skipped_by_older_schema() {
	// Logging path of the skip branch stays panic-free under a subscriber.
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::new("trace"))
		.try_init()
		.ok();

	let v1 = MessageSchema::builder(name("Profile"))
		.field(FieldDescriptor::scalar(1, "nick", ScalarKind::Text))
		.build()
		.expect("v1");
	let v2 = MessageSchema::builder(name("Profile"))
		.field(FieldDescriptor::scalar(1, "nick", ScalarKind::Text))
		.field(FieldDescriptor::scalar(2, "avatar_url", ScalarKind::Text))
		.field(FieldDescriptor::scalar(10007, "device_flags", ScalarKind::Uint64))
		.build()
		.expect("v2");

	let v1_registry = SchemaRegistry::builder().register(v1).build().expect("v1 registry");
	let v2_registry = SchemaRegistry::builder().register(v2).build().expect("v2 registry");

	let mut tree = ValueTree::new();
	tree.set(1, Value::Text("akkarin".into()));
	tree.set(2, Value::Text("https://example.com/a.png".into()));
	tree.set(10007, Value::Uint(3));

	let bytes = encode_message_default(&v2_registry, v2_registry.get("Profile").expect("v2"), &tree).expect("encode");

	let old_view = decode_message_default(&v1_registry, v1_registry.get("Profile").expect("v1"), &bytes).expect("decode");
	assert_eq!(old_view.text(1), Some("akkarin"));
	assert!(!old_view.contains(2));
	assert!(!old_view.contains(10007));
	assert!(old_view.unknown_fields().is_empty());

	// The same bytes with the preserve policy keep the payloads around.
	let options = DecodeOptions {
		unknown_fields: UnknownFieldPolicy::Preserve,
		..DecodeOptions::default()
	};
	let kept = decode_message(&v1_registry, v1_registry.get("Profile").expect("v1"), &bytes, &options).expect("decode");
	let tags: Vec<u32> = kept.unknown_fields().iter().map(|f| f.tag).collect();
	assert_eq!(tags, vec![2, 10007]);
}

#[test]
fn garbage_after_valid_field_is_rejected_not_misread() {
	let registry = im_registry();
	let schema = registry.get("MsgHead").expect("MsgHead");

	let mut tree = ValueTree::new();
	tree.set(1, Value::Uint(1));
	let mut bytes = encode_message_default(&registry, schema, &tree).expect("encode");
	// A lone continuation byte can never complete a tag header.
	bytes.push(0x80);

	let err = decode_message_default(&registry, schema, &bytes).unwrap_err();
	match err {
		DecodeError::TruncatedInput { .. } => {}
		other => panic!("unexpected error: {other:?}"),
	}
}

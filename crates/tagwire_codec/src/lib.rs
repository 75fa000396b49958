#![forbid(unsafe_code)]

pub mod message;
pub mod wire;

pub use message::{
	DEFAULT_RECURSION_LIMIT, DecodeError, DecodeOptions, EncodeError, EncodeOptions, UnknownFieldPolicy,
	decode_message, decode_message_default, encode_message, encode_message_default, encode_message_into,
};
pub use wire::{
	MAX_VARINT_LEN, WireError, put_fixed32, put_fixed64, put_length_delimited, put_tag, put_varint, read_fixed32,
	read_fixed64, read_length_delimited, read_tag_header, read_varint, zigzag_decode, zigzag_encode,
};

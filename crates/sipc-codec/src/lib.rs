//! Canonical hex encoding for structured IPC messages.
//!
//! A message is a sequence of entries. Each entry is a one-byte tag
//! (`R`, `E`, `S` or `W`) followed by space-prefixed values and a newline:
//!
//! ```text
//! R 5:mycmd 3 1p-1 [ 1 2 3 ] { 3:foo 3:bar } T 3|abc
//! ```
//!
//! Every value has exactly one encoding. Numbers share a single rule across
//! integers and floats, so the parser rejects anything a conforming encoder
//! would not have produced.

pub mod encode;
pub mod entry;
pub mod error;
pub mod frame;
pub mod hex;
#[cfg(feature = "json")]
pub mod json;
mod number;
pub mod parser;
pub mod value;

pub use encode::{
    append_array_end, append_array_start, append_bool, append_bytes, append_float, append_int,
    append_map_end, append_map_start, append_str, append_uint, append_value,
};
pub use entry::{
    append_entry_end, append_entry_start, build_entry, Entry, EntryType, MessageBuilder,
};
pub use error::{CodecError, Result};
pub use frame::{frame_message, unframe, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use parser::{parse_message, Parser, MAX_DEPTH};
pub use value::{Map, Value};

#[cfg(test)]
mod property_tests;

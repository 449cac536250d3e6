//! Binary analysis: printable-string and protobuf-identifier extraction

pub mod protobuf;
pub mod strings;

pub use protobuf::{compare_protobufs, extract_protobufs, ProtobufMatch};
pub use strings::{compare_string_sets, extract_strings, StringMatch, MIN_STRING_LEN};

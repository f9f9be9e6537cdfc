/// winnow readers for the little-endian primitives MST is built from
pub mod parser_utils;
/// Little-endian writers matching `parser_utils`
pub mod write_utils;

//! # Document
//!
//! Path-addressed mutation of semi-structured documents (YAML and JSON).
//!
//! - [`value`]: the generic map/sequence/scalar tree
//! - [`path`]: path expression parsing and navigation
//! - [`codec`]: bytes to tree and back
//! - [`mutator`]: transactional document and file rewrites

pub mod codec;
pub mod mutator;
pub mod path;
pub mod value;

pub use codec::{codec_for_path, CodecError, DocumentCodec, JsonCodec, YamlCodec};
pub use mutator::{
    apply_mutation, apply_mutations, read_path, update_path, value_at, Mutation, MutationError,
};
pub use path::{parse, replace_image_tag, validate, PathError, PathExpr, PathStep};
pub use value::{Scalar, Value};

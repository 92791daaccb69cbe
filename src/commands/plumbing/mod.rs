//! Plumbing commands (low-level operations)
//!
//! Direct access to the object store, mostly for scripting and debugging.
//!
//! ## Commands
//!
//! - `cat-file`: Print an object's type, size or content
//! - `hash-object`: Compute a blob id and optionally store it
//! - `ls-tree`: List the contents of a tree

pub mod cat_file;
pub mod hash_object;
pub mod ls_tree;

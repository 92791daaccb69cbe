//! Pack streams exchanged by fetch and push
//!
//! ```text
//! "PACK" | version u32 | count u32
//! count x ( claimed id [20] | kind u8 | length u32 | body [length] )
//! SHA-1 of everything above [20]
//! ```
//!
//! Integers are big-endian. Bodies are stored uncompressed; ids are only
//! claims until the receiving store re-hashes each body.

pub mod object_walk;
pub mod reader;
pub mod writer;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 1;

/// Signature, version and object count
pub const PACK_HEADER_SIZE: usize = 12;

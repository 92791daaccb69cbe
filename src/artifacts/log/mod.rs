//! Commit history traversal
//!
//! - `log_filter`: author, date range and count conditions
//! - `rev_list`: the lazy date-ordered walk over the commit graph

pub mod log_filter;
pub mod rev_list;

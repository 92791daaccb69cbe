//! Porcelain commands (user-facing operations)
//!
//! Each command is an `impl Repository` block that composes the stores and
//! returns plain data; rendering is left to the CLI.
//!
//! ## Commands
//!
//! - `init`, `clone`: create a repository
//! - `add`, `commit`, `status`, `diff`: the edit/stage/record loop
//! - `log`, `show`, `blame`: history
//! - `branch`, `tag`, `checkout`: refs and the working tree
//! - `merge`: three-way merges and fast-forwards
//! - `remote`, `fetch`, `pull`, `push`: talking to other repositories

pub mod add;
pub mod blame;
pub mod branch;
pub mod checkout;
pub mod clone;
pub mod commit;
pub mod diff;
pub mod fetch;
pub mod init;
pub mod log;
pub mod merge;
pub mod pull;
pub mod push;
pub mod remote;
pub mod show;
pub mod status;
pub mod tag;

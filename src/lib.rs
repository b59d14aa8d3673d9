//! Keeps a history of the apps you launch by watching the activity manager log.
//! The log is read as a plain stream of lines, so it can come from a device log reader, a file,
//! or anything else that can be turned into lines.
//!

pub mod cli;
pub mod daemon;
pub mod utils;

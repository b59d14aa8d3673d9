//!  Storage of launch history is organized through [history_storage::HistoryStorage].
//!  The basic idea is:
//!   - There is a single history file inside the application directory.
//!   - Every line of the file is a JSON entry for one package.
//!   - Each launch rewrites the file with the count of that package increased.

pub mod entities;
pub mod history_storage;

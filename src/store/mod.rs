//! Persistence split across the CSV codec and the file-backed durable store.

pub mod codec;
mod file;

pub use codec::{decode, encode, read_records, write_records, FIELD_COUNT};
pub use file::{commit, load, save, temp_path_for, write_atomic, write_temp};

pub mod json_file;

pub use json_file::{load_json, persist_json};

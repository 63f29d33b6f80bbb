pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fatal;
pub mod main_lib;
pub mod scheduler;
pub mod signals;
pub mod sink;

pub use main_lib::{build_app, init_tracing, AppState, Workers};

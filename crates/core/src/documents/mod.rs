//! Vendor documents and their translation into observations.

mod documents_model;
mod mapping;

pub use documents_model::*;
pub use mapping::{map_document, map_search_page, MappedPage};

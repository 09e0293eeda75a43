//! Orchestrators composing the store traits into the public contract.

mod data;
mod definition;

pub use data::{EntityDataService, QueryResult, StoredRecord, prepare_values};
pub use definition::EntityDefinitionService;

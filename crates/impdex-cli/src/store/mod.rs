//! Catalog storage: the SQLite database and its writer actor.

pub mod actor;
pub mod db;

pub use actor::CatalogHandle;
pub use db::{Catalog, CatalogError};

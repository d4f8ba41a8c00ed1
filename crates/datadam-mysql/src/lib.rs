//! MySQL backend for datadam.

mod backend;
mod mapper;
mod queries;
pub mod statement;

pub use backend::{MySqlBackend, MySqlCatalog, MySqlFactory};
pub use statement::Statement;

pub mod database;
pub mod lifecycle;
pub mod scope;

pub use database::Database;
pub use scope::AccessScope;

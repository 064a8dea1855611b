pub mod field;
pub mod schema;
pub mod definitions;

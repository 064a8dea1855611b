pub mod document;
pub mod memory;
pub mod status;
pub mod collection;
pub mod factory;
pub mod versions;

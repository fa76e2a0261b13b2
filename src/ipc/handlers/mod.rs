pub mod catalog;
pub mod core;
pub mod entry;
pub mod results;
pub mod setup;

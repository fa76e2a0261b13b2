pub mod error;
pub mod model;
pub mod nav;
pub mod net;
pub mod paste;
pub mod roster;
pub mod store;
pub mod validate;

pub use error::EntryError;
pub use model::{Field, ResultRecord, Student, StudentResult, Subject};
pub use net::PenaltyDivisor;
pub use store::ResultGridStore;

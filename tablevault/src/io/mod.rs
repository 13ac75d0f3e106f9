//! io module provides access to the object stores holding containers and
//! rejection logs.

mod args;
pub use args::*;

mod store;
pub use store::ContainerStore;

mod audit;
pub use audit::{RejectedRow, RejectionLog};

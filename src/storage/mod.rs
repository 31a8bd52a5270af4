mod atomic;
mod error;
mod lease;
mod store;

pub use error::*;
pub use lease::{Lease, LeaseRecord, LeaseSettings, read_lease};
pub use store::*;

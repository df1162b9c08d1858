pub mod analysis;
pub mod file_access;
pub mod snapshot;

pub use analysis::*;
pub use file_access::*;
pub use snapshot::*;

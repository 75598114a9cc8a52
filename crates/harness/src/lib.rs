pub mod bench;
pub mod faults;

pub use bench::*;
pub use faults::FaultyStore;

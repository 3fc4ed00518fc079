//! Domain models for the neuroDash dashboard.

mod report;
mod table;
mod value;

pub use report::*;
pub use table::*;
pub use value::*;

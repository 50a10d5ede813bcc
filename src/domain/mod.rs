pub mod cohort;
pub mod error;
pub mod grid;
pub mod plan;
pub mod types;
pub mod weather;

pub use cohort::*;
pub use error::*;
pub use grid::*;
pub use plan::*;
pub use types::*;
pub use weather::*;

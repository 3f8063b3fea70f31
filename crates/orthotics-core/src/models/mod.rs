//! Domain models for the orthotics portal.

mod choices;
mod clinic;
mod details;
mod invoice;
mod order;
mod patient;
mod prescription;
mod scan;
mod template;

pub use clinic::*;
pub use details::*;
pub use invoice::*;
pub use order::*;
pub use patient::*;
pub use prescription::*;
pub use scan::*;
pub use template::*;

//! Invoice export and document rendering.

mod invoice;
mod render;

pub use invoice::*;
pub use render::*;

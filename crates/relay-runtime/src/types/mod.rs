//! Canonical provider-agnostic types

pub mod image;
pub mod message;
pub mod model;
pub mod payload;
pub mod stream;

pub use image::*;
pub use message::*;
pub use model::*;
pub use payload::*;
pub use stream::*;

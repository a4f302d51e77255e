//! Upstream wire format types

pub mod images;
pub mod openai;
pub mod responses;

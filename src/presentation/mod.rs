//! Views, templates and feed serialization.

pub mod feed;
pub mod views;

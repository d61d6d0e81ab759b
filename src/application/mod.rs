//! Application services: the conditional-response pipeline, site routes and
//! the category write path.

pub mod admin;
pub mod error;
pub mod freshness;
pub mod pipeline;
pub mod repos;
pub mod site;

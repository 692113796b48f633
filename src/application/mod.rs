//! Application services orchestrating the domain against its ports.

pub mod error;
pub mod likes;
pub mod repos;

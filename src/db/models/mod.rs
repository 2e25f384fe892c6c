//! Database models split into domain-specific modules.

pub mod appointment;
pub mod company;
pub mod user;

pub use appointment::*;
pub use company::*;
pub use user::*;

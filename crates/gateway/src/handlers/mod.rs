//! API handlers module

pub mod health;
pub mod patents;
pub mod search;

//! API handlers module

pub mod answer;
pub mod contexts;
pub mod health;

// src/models/mod.rs

pub mod exam;
pub mod identity;
pub mod session;
pub mod submission;

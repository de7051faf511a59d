// src/handlers/mod.rs

pub mod general;
pub mod payments;
pub mod payroll;
pub mod periods;

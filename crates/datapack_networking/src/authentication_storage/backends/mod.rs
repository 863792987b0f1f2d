//! Backends to look up credentials in

pub mod configured;
pub mod file;

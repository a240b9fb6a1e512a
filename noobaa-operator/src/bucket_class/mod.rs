pub mod controller;
pub mod error;
pub mod policy;
pub mod update;

#[cfg(test)]
pub mod fixtures;

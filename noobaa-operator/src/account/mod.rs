pub mod controller;
pub mod error;
pub mod logic;

#[cfg(test)]
pub mod fixtures;

pub mod builders;
pub mod controller;
pub mod error;
pub mod pool;
pub mod verify;

#[cfg(test)]
pub mod fixtures;

pub mod builders;
pub mod configure;
pub mod controller;
pub mod error;
pub mod readme;
pub mod status;
pub mod verify;

#[cfg(test)]
pub mod fixtures;

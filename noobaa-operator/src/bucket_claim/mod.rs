//! Provisioning of buckets requested through object bucket claims.

pub mod builders;
pub mod controller;
pub mod error;
pub mod provision;

#[cfg(test)]
pub mod fixtures;

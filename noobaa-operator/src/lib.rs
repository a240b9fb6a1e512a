#![allow(clippy::result_large_err)]

pub mod account;
pub mod api;
pub mod bucket_claim;
pub mod bucket_class;
pub mod cli;
pub mod config;
pub mod events;
pub mod manager;
pub mod phase;
pub mod quantity;
pub mod remote;
pub mod resources;
pub mod secret;
pub mod store;
pub mod system;
pub mod wait;

#[cfg(test)]
mod testing;

pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

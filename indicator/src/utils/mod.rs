//! Utility modules for the Vagrant indicator.
//!
//! # Modules
//!
//! - [`debounce`]: Settling bursts of file-change signals into one re-read

pub mod debounce;

pub use debounce::settle;

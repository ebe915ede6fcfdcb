//! Compile-time configuration defaults
//!
//! Generated by `build.rs` from the library defaults, merged with the file
//! named by `ECORE_CONFIG_RS` when set at build time.

include!(concat!(env!("OUT_DIR"), "/ecore_merged_config.rs"));

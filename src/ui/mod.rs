//! # UI Module
//!
//! Shared styling for the Harald window. The panes themselves are built in
//! `app.rs`.

pub mod styles;

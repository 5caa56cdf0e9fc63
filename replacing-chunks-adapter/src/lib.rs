//! Adapter utilities for the `replacing-chunks` crate.
//!
//! `replacing-chunks` knows about buffer positions, not pixels. This crate provides small,
//! framework-neutral helpers that list widgets built on top of it commonly need:
//!
//! - Row anchoring (keep a record at the same row of the window across reloads)
//! - A scroll controller mapping a pixel scroll offset to the array's window, with scroll
//!   compensation when older records are inserted above
//!
//! This crate is intentionally framework-agnostic (no ratatui/egui bindings).
#![forbid(unsafe_code)]

mod anchor;
mod controller;


pub use anchor::{RowAnchor, apply_anchor, capture_first_visible_anchor};
pub use controller::{Controller, ScrollCorrection};

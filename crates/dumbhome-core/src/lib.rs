//! Core state for the dumbhome launcher.
//!
//! This crate holds everything that is independent of the platform surface:
//! the durable preference store, theme derivation, error types, and logging
//! setup. The services crate (`dumbhome`) builds the app list, widget
//! hosting, and weather behavior on top of these types.

pub mod error;
pub mod logging;
pub mod prefs;
pub mod theme;

pub use error::{Error, Result};
pub use prefs::{IconSize, INVALID_WIDGET_ID, Prefs, PrefsStore};
pub use theme::{Color, DIM_FACTOR, Theme};

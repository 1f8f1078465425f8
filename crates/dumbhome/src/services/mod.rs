//! Launcher services.
//!
//! Each service wraps one platform concern behind a trait so the core logic
//! stays testable off-device: app enumeration, widget hosting, weather, and
//! system-settings writes.

pub mod app_directory;
pub mod clock;
pub mod system_settings;
pub mod weather;
pub mod widget_host;

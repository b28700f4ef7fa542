//! Pure, deterministic logic. No I/O.

pub mod settings;
pub mod version;

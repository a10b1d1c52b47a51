//! Embedded static web assets.
//!
//! Compiled into the binary via `include_str!` so a build needs no asset
//! files next to the executable.

/// Base site stylesheet. The highlighting theme's rules are appended to it
/// when the site is built.
///
/// Loaded from `src/assets/site.css` at compile time.
pub const CSS: &str = include_str!("assets/site.css");

//! Utility functions shared by the feed and archive modules.
//!
//! - **Identifier normalization**: map titles and URLs onto filesystem-safe names
//! - **Atomic writes**: temp-file-then-rename so derived paths are never half written
//!
//! # Examples
//!
//! ```
//! use podqueue::util::{normalize, underscore_spaces};
//!
//! let dir = normalize(&underscore_spaces("My Show: Live")).into_owned();
//! assert_eq!(dir, "My_Show__Live");
//! ```

pub mod fs;
mod normalize;

pub use normalize::{normalize, underscore_spaces};

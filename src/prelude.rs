pub use std::fmt::Display;
pub use std::str::FromStr;

pub use serde::{Deserialize, Serialize};
pub use serde_with::{DeserializeFromStr, SerializeDisplay};
pub use url::Url;
pub use tracing::{debug, info, trace, warn};

pub use crate::error::{FetchError, Result};

use directories::ProjectDirs;
use once_cell::sync::Lazy;

/// Per-OS project directories used as the default cache location when a
/// caller doesn't supply its own `cache_root`. Keyed on the crate's own
/// name; [`crate::retrieve::retrieve`] lets a caller override the
/// application name instead.
pub(crate) static DEFAULT_PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", env!("CARGO_PKG_NAME")));

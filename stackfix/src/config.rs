//! Environment-driven settings.

use log::debug;

/// Default number of frames a stack walker captures.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Runtime settings for the correction layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// When set, [`Installer::install`](crate::Installer::install) marks itself
    /// installed without attaching anything.
    pub disabled: bool,
    /// Upper bound on frames captured per stack walk.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disabled: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Config {
    /// Read `STACKFIX_DISABLE` and `STACKFIX_MAX_DEPTH`.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("STACKFIX_DISABLE").ok().as_deref(),
            std::env::var("STACKFIX_MAX_DEPTH").ok().as_deref(),
        )
    }

    fn from_vars(disable: Option<&str>, max_depth: Option<&str>) -> Self {
        let disabled = matches!(disable.map(str::trim), Some(v) if !v.is_empty() && v != "0");
        let max_depth = match max_depth {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) => n,
                Err(e) => {
                    debug!("Ignoring STACKFIX_MAX_DEPTH={:?}: {}", raw, e);
                    DEFAULT_MAX_DEPTH
                }
            },
            None => DEFAULT_MAX_DEPTH,
        };
        Self { disabled, max_depth }
    }
}

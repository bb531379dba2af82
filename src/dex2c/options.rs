//! Protection run configuration
//!
//! This module holds the knobs of a split and repack run that are not tied to a single
//! input container: where registration calls point, how new output pools are sized and
//! whether per-input work runs on the rayon thread pool.

use crate::pool::MAX_ENTITIES;

/// Ceiling passed to the repacker by default.
///
/// Leaves room below [`MAX_ENTITIES`] for the entities a single class pulls in after the
/// ceiling is reached, since overflow is only checked after each class.
pub const DEFAULT_MAX_POOL_SIZE: usize = MAX_ENTITIES - 0x1000;

/// Internal name of the default registration holder class
pub const DEFAULT_REGISTER_NATIVES_CLASS: &str = "dexsplit/NativeRegistry";

/// Default prefix of the per-container registration method
pub const DEFAULT_METHOD_NAME_PREFIX: &str = "registerNatives";

/// Configuration for a protection run
///
/// Every input container gets its own registration method on the shared holder class,
/// named by the prefix and the container's file stem (`registerNatives_classes2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectConfig {
    /// Entity ceiling at which the repacker starts a new output pool
    pub max_pool_size: usize,

    /// Internal name (`com/example/Registry`) of the class declaring the registration methods
    pub register_natives_class: String,

    /// Prefix of the registration method names
    pub method_name_prefix: String,

    /// Process independent inputs, and classes within one input, on the rayon thread pool
    pub parallel: bool,

    /// Create the output directory when it does not exist yet
    pub create_output_dir: bool,
}

impl Default for ProtectConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            register_natives_class: DEFAULT_REGISTER_NATIVES_CLASS.to_string(),
            method_name_prefix: DEFAULT_METHOD_NAME_PREFIX.to_string(),
            parallel: true,
            create_output_dir: true,
        }
    }
}

impl ProtectConfig {
    /// Creates a configuration that does all work on the calling thread
    ///
    /// Output is identical to the parallel configuration; this only trades speed for
    /// predictable log ordering.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Creates a configuration that packs output pools up to the hard container limit
    ///
    /// **Warning**: a class pulling in new entities after the ceiling is reached makes the
    /// pool fail to serialize with [`crate::Error::TooManyEntities`].
    #[must_use]
    pub fn dense() -> Self {
        Self {
            max_pool_size: MAX_ENTITIES,
            ..Self::default()
        }
    }

    /// Sets the repack ceiling
    #[must_use]
    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    /// Sets the registration holder class, given as an internal name
    #[must_use]
    pub fn with_register_natives_class(mut self, class: impl Into<String>) -> Self {
        self.register_natives_class = class.into();
        self
    }

    /// Sets the registration method name prefix
    #[must_use]
    pub fn with_method_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.method_name_prefix = prefix.into();
        self
    }

    /// Enables or disables rayon parallelism
    #[must_use]
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables creation of a missing output directory
    #[must_use]
    pub fn with_create_output_dir(mut self, create: bool) -> Self {
        self.create_output_dir = create;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_config_presets() {
        let default = ProtectConfig::default();
        assert!(default.parallel);
        assert!(default.create_output_dir);
        assert!(default.max_pool_size < MAX_ENTITIES);
        assert_eq!(default.register_natives_class, DEFAULT_REGISTER_NATIVES_CLASS);

        let sequential = ProtectConfig::sequential();
        assert!(!sequential.parallel);
        assert_eq!(sequential.max_pool_size, default.max_pool_size);

        assert_eq!(ProtectConfig::dense().max_pool_size, MAX_ENTITIES);
    }

    #[test]
    fn test_protect_config_setters() {
        let config = ProtectConfig::default()
            .with_max_pool_size(2)
            .with_register_natives_class("app/Natives")
            .with_method_name_prefix("init")
            .with_parallelism(false)
            .with_create_output_dir(false);

        assert_eq!(config.max_pool_size, 2);
        assert_eq!(config.register_natives_class, "app/Natives");
        assert_eq!(config.method_name_prefix, "init");
        assert!(!config.parallel);
        assert!(!config.create_output_dir);
    }
}

//! Configuration types for the bridge.
//!
//! Everything has a sensible default, can be adjusted with `with_*`
//! builders, and can be loaded from a TOML document:
//!
//! ```toml
//! library_path = "/usr/lib/libsvm_runtime_c_api.so"
//! codec_path = "svm_codec.wasm"
//! tx_version = 0
//!
//! [engine]
//! fuel_enabled = false
//!
//! [guest]
//! max_memory_bytes = 67108864
//!
//! [gas]
//! metering = false
//! limit = 0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path of the native runtime shared library.
    pub library_path: Option<PathBuf>,
    /// Path of the codec WASM module.
    pub codec_path: Option<PathBuf>,
    /// Wasmtime engine settings for the codec.
    pub engine: EngineConfig,
    /// Limits applied to every codec instance.
    pub guest: GuestLimits,
    /// Gas settings passed to deploy, spawn and exec.
    pub gas: GasConfig,
    /// Transaction format version used by the encoders.
    pub tx_version: u32,
}

impl BridgeConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check that values are usable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.max_wasm_stack == 0 {
            return Err(ConfigError::Invalid("engine.max_wasm_stack must be > 0".into()));
        }
        if self.guest.max_memory_bytes < WASM_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "guest.max_memory_bytes must be at least one page ({WASM_PAGE_SIZE} bytes)"
            )));
        }
        if self.engine.fuel_enabled && self.guest.initial_fuel.is_none() {
            return Err(ConfigError::Invalid(
                "guest.initial_fuel is required when engine.fuel_enabled is set".into(),
            ));
        }
        Ok(())
    }

    /// Set the native library path.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Set the codec module path.
    pub fn with_codec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.codec_path = Some(path.into());
        self
    }

    /// Set the engine configuration.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the guest limits.
    pub fn with_guest_limits(mut self, guest: GuestLimits) -> Self {
        self.guest = guest;
        self
    }

    /// Set the gas configuration.
    pub fn with_gas(mut self, gas: GasConfig) -> Self {
        self.gas = gas;
        self
    }

    /// Set the transaction version.
    pub fn with_tx_version(mut self, version: u32) -> Self {
        self.tx_version = version;
        self
    }
}

/// Size of a WebAssembly page.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Configuration for the codec's Wasmtime engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Meter guest execution with fuel.
    ///
    /// Codec calls are short and trusted, so this is off by default.
    pub fuel_enabled: bool,

    /// Maximum WASM stack size in bytes.
    ///
    /// Defaults to 1MB.
    pub max_wasm_stack: usize,

    /// Emit debug information in compiled code.
    pub debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_enabled: false,
            max_wasm_stack: 1024 * 1024, // 1MB
            debug_info: false,
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable fuel metering.
    pub fn with_fuel(mut self, enabled: bool) -> Self {
        self.fuel_enabled = enabled;
        self
    }

    /// Set the maximum WASM stack size.
    pub fn with_max_wasm_stack(mut self, bytes: usize) -> Self {
        self.max_wasm_stack = bytes;
        self
    }

    /// Enable debug information.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }
}

/// Limits applied to each codec instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestLimits {
    /// Maximum linear memory in bytes.
    ///
    /// Defaults to 64MB.
    pub max_memory_bytes: usize,

    /// Fuel per instance, when the engine meters fuel.
    pub initial_fuel: Option<u64>,
}

impl Default for GuestLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 64 * 1024 * 1024, // 64MB
            initial_fuel: None,
        }
    }
}

impl GuestLimits {
    /// Create limits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory limit.
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Set the fuel per instance.
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.initial_fuel = Some(fuel);
        self
    }

    /// Tight limits for tests.
    pub fn minimal() -> Self {
        Self {
            max_memory_bytes: 2 * 1024 * 1024, // 2MB
            initial_fuel: Some(1_000_000),
        }
    }

    /// Limits for typical codec workloads.
    pub fn standard() -> Self {
        Self::default()
    }
}

/// Gas inputs for deploy, spawn and exec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Whether the runtime meters gas.
    pub metering: bool,
    /// Gas limit when metering.
    pub limit: u64,
}

impl GasConfig {
    /// Metered execution with the given limit.
    pub fn metered(limit: u64) -> Self {
        Self {
            metering: true,
            limit,
        }
    }

    /// Unmetered execution.
    pub fn unmetered() -> Self {
        Self::default()
    }
}

//! Wasmtime engine wrapper for the codec.

use std::sync::Arc;

use svm_bridge_core::EngineConfig;
use tracing::info;
use wasmtime::{Config, Engine};

use crate::error::{EngineError, EngineResult};

/// The engine codec modules are compiled with.
///
/// One engine is shared by the compiled module and every guest instance
/// created from it.
///
/// # Example
///
/// ```
/// use svm_bridge_codec::CodecEngine;
/// use svm_bridge_core::EngineConfig;
///
/// let engine = CodecEngine::new(EngineConfig::default()).unwrap();
/// assert!(!engine.fuel_enabled());
/// ```
pub struct CodecEngine {
    inner: Engine,
    config: EngineConfig,
}

impl CodecEngine {
    /// Create a new engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable or Wasmtime
    /// rejects it.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        if config.max_wasm_stack == 0 {
            return Err(EngineError::InvalidConfig(
                "max_wasm_stack must be greater than zero".into(),
            ));
        }

        let mut wasmtime_config = Config::new();
        wasmtime_config.consume_fuel(config.fuel_enabled);
        wasmtime_config.max_wasm_stack(config.max_wasm_stack);
        wasmtime_config.debug_info(config.debug_info);

        // The codec protocol copies buffers with memory.copy
        wasmtime_config.wasm_bulk_memory(true);
        wasmtime_config.wasm_multi_value(true);

        let inner = Engine::new(&wasmtime_config)?;

        info!(
            fuel = config.fuel_enabled,
            max_wasm_stack = config.max_wasm_stack,
            "Created codec engine"
        );

        Ok(Self { inner, config })
    }

    /// Create a new engine with default configuration.
    pub fn default_engine() -> EngineResult<Self> {
        Self::new(EngineConfig::default())
    }

    /// Get a reference to the underlying Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.inner
    }

    /// Get the configuration used to create this engine.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if fuel metering is enabled.
    pub fn fuel_enabled(&self) -> bool {
        self.config.fuel_enabled
    }
}

impl std::fmt::Debug for CodecEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecEngine")
            .field("config", &self.config)
            .finish()
    }
}

/// A shared reference to a codec engine.
pub type SharedEngine = Arc<CodecEngine>;

/// Extension trait for creating shared engines.
pub trait IntoShared {
    /// Convert into a shared engine reference.
    fn into_shared(self) -> SharedEngine;
}

impl IntoShared for CodecEngine {
    fn into_shared(self) -> SharedEngine {
        Arc::new(self)
    }
}

//! Test harness for the Helios renderer.
//!
//! Provides a fixture scene (one emissive triangle), a fixture
//! "compiler" whose compiled shaders are native functions driving the
//! full shader ABI, and helpers for end-to-end pipeline tests without
//! a real JIT.

pub mod compiler;
pub mod scene;
pub mod shaders;

#[cfg(test)]
mod tests;

use std::sync::Once;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// The device interface is a process-wide singleton; pipeline tests
/// must not overlap.
pub static DEVICE_LOCK: Mutex<()> = Mutex::new(());

static INIT_LOGGING: Once = Once::new();

/// Install a log subscriber once per test process.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

use helios_runtime::{Runtime, RuntimeOptions};

/// Build a runtime wired to the fixture loader and compiler.
#[must_use]
pub fn fixture_runtime(options: RuntimeOptions) -> Runtime {
    init_logging();
    Runtime::new(
        options,
        Box::new(scene::FixtureSceneLoader),
        Box::new(compiler::FixtureCompiler),
    )
}

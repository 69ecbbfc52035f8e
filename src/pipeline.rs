//! End-to-end driver: module in, return value out.
//!
//! One pipeline, parameterized by the resolver's strategy and by how
//! failures leave it. Every stage returns a typed error and nothing is
//! retried; `ErrorPolicy` only decides whether the caller sees the error or
//! the process ends with the reserved exit code.

use crate::context::AbiSignature;
use crate::error::PipelineError;
use crate::invoke::ReturnValue;
use crate::ir::Module;
use crate::jit::{Engine, EngineConfig};
use crate::resolver::SymbolResolver;

/// What to do when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Surface the typed error to the caller.
    Propagate,
    /// Render the error to stderr and exit with [`FAILURE_EXIT_CODE`].
    Abort,
}

/// Process exit code reserved for pipeline failure before invocation.
/// Distinct from anything the compiled program itself is expected to return.
pub const FAILURE_EXIT_CODE: i32 = 2;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub policy: ErrorPolicy,
    pub engine: EngineConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            policy: ErrorPolicy::Propagate,
            engine: EngineConfig::default(),
        }
    }
}

/// Compile `module`, look up `entry`, and invoke it with `expected`.
///
/// Under `ErrorPolicy::Abort` this function does not return on failure.
pub fn run_module(
    module: Module,
    resolver: SymbolResolver,
    options: &PipelineOptions,
    entry: &str,
    expected: &AbiSignature,
) -> Result<ReturnValue, PipelineError> {
    match execute(module, resolver, &options.engine, entry, expected) {
        Ok(value) => Ok(value),
        Err(err) => match options.policy {
            ErrorPolicy::Propagate => Err(err),
            ErrorPolicy::Abort => {
                eprintln!("smelt: {}", err);
                std::process::exit(FAILURE_EXIT_CODE);
            }
        },
    }
}

fn execute(
    module: Module,
    resolver: SymbolResolver,
    config: &EngineConfig,
    entry: &str,
    expected: &AbiSignature,
) -> Result<ReturnValue, PipelineError> {
    let mut engine = Engine::new(resolver, config.clone())?;
    engine.add_module(module)?;
    let entry = engine.lookup(entry)?;
    Ok(entry.invoke(expected)?)
}

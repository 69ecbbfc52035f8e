//! # smelt — build IR in memory, run it as native code
//!
//! smelt constructs a small SSA program representation entirely in memory,
//! compiles it just-in-time with Cranelift, resolves external references
//! against explicit bindings or the host process, and invokes the result
//! through a signature-checked wrapper.
//!
//! ## Quick Start
//!
//! ```
//! use smelt::{
//!     AbiSignature, AbiType, Context, Engine, EngineConfig, IrBuilder, Module,
//!     ResolutionStrategy, ReturnValue, Signature, SymbolResolver,
//! };
//!
//! // Build: fn main() -> i32 { 42 }
//! let ctx = Context::new();
//! let mut module = Module::new(ctx, "demo");
//! let mut b = IrBuilder::new(&mut module);
//! let i32t = b.int32();
//! let main_fn = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
//! let entry = b.append_block(main_fn, "entry").unwrap();
//! b.set_insertion_point(main_fn, entry).unwrap();
//! let answer = b.const_int(i32t, 42).unwrap();
//! b.ret(Some(answer)).unwrap();
//!
//! // Compile and invoke.
//! let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
//! let mut engine = Engine::new(resolver, EngineConfig::default()).unwrap();
//! engine.add_module(module).unwrap();
//! let compiled = engine.lookup("main").unwrap();
//! let expected = AbiSignature::nullary(Some(AbiType::I32));
//! assert_eq!(compiled.invoke(&expected).unwrap(), ReturnValue::Int32(42));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! IrBuilder ──► Module (owns Context) ──move──► Engine ──► native code
//!                                                 │
//!                             SymbolResolver ◄────┘ (externals)
//! ```
//!
//! Ownership draws the stage boundaries: the context moves into the module
//! it serves, and the module moves into the engine at `add_module`. After
//! the move the builder-side handles are gone, so compiled structure can
//! never be mutated behind the engine's back.

pub mod context;
pub mod error;
pub mod invoke;
pub mod ir;
pub mod jit;
pub mod pipeline;
pub mod resolver;

pub use context::{AbiSignature, AbiType, Context, DataId, TyId, TypeKind};
pub use error::{
    BuildError, CompileError, InvokeError, LookupError, PipelineError, ResolveError,
    VerificationError,
};
pub use invoke::{CompiledEntry, ReturnValue};
pub use ir::{
    verify_module, BasicBlock, BinOp, BlockId, FuncId, Function, Instr, IrBuilder, Module,
    Signature, Terminator, ValueId,
};
pub use jit::{Engine, EngineConfig, OptLevel};
pub use pipeline::{run_module, ErrorPolicy, PipelineOptions, FAILURE_EXIT_CODE};
pub use resolver::{ResolutionStrategy, SymbolResolver};

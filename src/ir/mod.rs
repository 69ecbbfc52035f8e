//! In-memory intermediate representation.
//!
//! The IR is SSA form with basic blocks, built imperatively through
//! [`IrBuilder`] inside a [`Module`] that owns its
//! [`Context`](crate::context::Context).
//!
//! Pipeline:
//! ```text
//! IrBuilder → Module → verify → Engine (Cranelift) → native code
//! ```

mod builder;
mod module;
mod types;
mod verify;

pub use builder::IrBuilder;
pub use module::Module;
pub use types::{
    BasicBlock, BinOp, BlockId, FuncId, Function, Instr, Signature, Terminator, ValueId,
};
pub use verify::verify_module;

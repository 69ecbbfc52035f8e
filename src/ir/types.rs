//! IR type definitions.

use smallvec::SmallVec;

use crate::context::{AbiSignature, Context, DataId, TyId};

/// Function handle, unique within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Basic block handle, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// SSA value handle, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// Function signature: fixed parameter types, return type, variadic flag.
///
/// Types are context-interned handles; use [`Signature::abi`] for the
/// context-free view once the owning context is out of reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<TyId>,
    pub ret: TyId,
    pub variadic: bool,
}

impl Signature {
    pub fn new(params: Vec<TyId>, ret: TyId) -> Self {
        Signature {
            params,
            ret,
            variadic: false,
        }
    }

    /// Signature accepting extra arguments past the fixed parameters.
    pub fn variadic(params: Vec<TyId>, ret: TyId) -> Self {
        Signature {
            params,
            ret,
            variadic: true,
        }
    }

    /// Resolve the interned types to their machine-level shapes.
    pub fn abi(&self, ctx: &Context) -> AbiSignature {
        AbiSignature {
            params: self
                .params
                .iter()
                .filter_map(|&t| ctx.abi_type(t))
                .collect(),
            ret: ctx.abi_type(self.ret),
            variadic: self.variadic,
        }
    }
}

/// Integer arithmetic, wrapping on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

/// IR instruction (SSA form: each value is assigned exactly once).
#[derive(Debug, Clone)]
pub enum Instr {
    /// Materialize a pointer to an interned NUL-terminated byte sequence.
    StrConst { dst: ValueId, data: DataId },
    /// Integer constant of the destination's type.
    IConst { dst: ValueId, value: i64 },
    /// Integer arithmetic over two values of the same type.
    BinOp {
        dst: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Call a declared function. `dst` is `None` for void callees.
    Call {
        dst: Option<ValueId>,
        callee: FuncId,
        args: SmallVec<[ValueId; 4]>,
    },
}

/// How control leaves a block.
#[derive(Debug, Clone)]
pub enum Terminator {
    /// Return from the function, with a value unless the function is void.
    Return(Option<ValueId>),
    /// Unconditional jump.
    Jump(BlockId),
    /// Two-way branch: nonzero condition takes `then_block`.
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
}

/// A straight-line instruction sequence ending in exactly one terminator.
///
/// The builder refuses to emit past a terminator, so a finished block holds
/// its terminator in `terminator`; `None` means the block was left unfinished
/// and verification will reject it.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instrs: Vec<Instr>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlock {
            label: label.into(),
            instrs: Vec::new(),
            terminator: None,
        }
    }
}

/// A function: declaration (external, no blocks) or definition.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    /// True for declarations whose address comes from the symbol resolver.
    pub external: bool,
    pub blocks: Vec<BasicBlock>,
    /// Parameter values, one per fixed parameter, in order.
    pub params: Vec<ValueId>,
    /// Type of each SSA value, indexed by `ValueId`.
    pub values: Vec<TyId>,
}

impl Function {
    pub(crate) fn external(name: impl Into<String>, sig: Signature) -> Self {
        Function {
            name: name.into(),
            sig,
            external: true,
            blocks: Vec::new(),
            params: Vec::new(),
            values: Vec::new(),
        }
    }

    pub(crate) fn define(name: impl Into<String>, sig: Signature) -> Self {
        let mut f = Function {
            name: name.into(),
            sig,
            external: false,
            blocks: Vec::new(),
            params: Vec::new(),
            values: Vec::new(),
        };
        for i in 0..f.sig.params.len() {
            let ty = f.sig.params[i];
            let v = f.new_value(ty);
            f.params.push(v);
        }
        f
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn value_ty(&self, v: ValueId) -> TyId {
        self.values[v.0 as usize]
    }

    pub(crate) fn new_value(&mut self, ty: TyId) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub(crate) fn valid_value(&self, v: ValueId) -> bool {
        (v.0 as usize) < self.values.len()
    }

    pub(crate) fn valid_block(&self, b: BlockId) -> bool {
        (b.0 as usize) < self.blocks.len()
    }
}

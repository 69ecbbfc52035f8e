//! Imperative IR construction.
//!
//! The builder keeps an insertion point (function, block) and appends
//! instructions there. It enforces the structural rules synchronously:
//! emitting without an insertion point or past a terminator is an error at
//! the call site. Type-level rules are the verifier's job, so a module that
//! was built without errors can still fail verification.

use smallvec::SmallVec;

use super::module::Module;
use super::types::{BinOp, BlockId, FuncId, Instr, Signature, Terminator, ValueId};
use crate::context::TyId;
use crate::error::BuildError;

pub struct IrBuilder<'m> {
    module: &'m mut Module,
    point: Option<(FuncId, BlockId)>,
}

impl<'m> IrBuilder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        IrBuilder {
            module,
            point: None,
        }
    }

    // Type shorthands, so call sites read like the IR they produce.

    pub fn void(&mut self) -> TyId {
        self.module.ctx_mut().void()
    }

    pub fn int8(&mut self) -> TyId {
        self.module.ctx_mut().int8()
    }

    pub fn int32(&mut self) -> TyId {
        self.module.ctx_mut().int32()
    }

    pub fn int64(&mut self) -> TyId {
        self.module.ctx_mut().int64()
    }

    pub fn ptr_to(&mut self, pointee: TyId) -> TyId {
        self.module.ctx_mut().ptr_to(pointee)
    }

    // Declarations.

    pub fn declare_external(
        &mut self,
        name: &str,
        sig: Signature,
    ) -> Result<FuncId, BuildError> {
        self.module.declare_external(name, sig)
    }

    pub fn get_or_declare_external(
        &mut self,
        name: &str,
        sig: Signature,
    ) -> Result<FuncId, BuildError> {
        self.module.get_or_declare_external(name, sig)
    }

    pub fn create_function(
        &mut self,
        name: &str,
        sig: Signature,
    ) -> Result<FuncId, BuildError> {
        self.module.create_function(name, sig)
    }

    /// Value of the `index`-th fixed parameter of `func`.
    pub fn func_param(&self, func: FuncId, index: usize) -> Result<ValueId, BuildError> {
        let f = self.module.func(func).ok_or(BuildError::UnknownFunction)?;
        f.params
            .get(index)
            .copied()
            .ok_or_else(|| BuildError::BadParamIndex {
                func: f.name.clone(),
                index,
            })
    }

    /// Append a fresh block to `func`. Externals have no bodies.
    pub fn append_block(&mut self, func: FuncId, label: &str) -> Result<BlockId, BuildError> {
        let f = self
            .module
            .func_mut(func)
            .ok_or(BuildError::UnknownFunction)?;
        if f.is_external() {
            return Err(BuildError::ExternalBody {
                name: f.name.clone(),
            });
        }
        let id = BlockId(f.blocks.len() as u32);
        f.blocks.push(super::types::BasicBlock::new(label));
        Ok(id)
    }

    /// Point subsequent emits at the end of `block`.
    pub fn set_insertion_point(
        &mut self,
        func: FuncId,
        block: BlockId,
    ) -> Result<(), BuildError> {
        let f = self.module.func(func).ok_or(BuildError::UnknownFunction)?;
        if !f.valid_block(block) {
            return Err(BuildError::UnknownBlock {
                func: f.name.clone(),
            });
        }
        self.point = Some((func, block));
        Ok(())
    }

    /// Current insertion point, checked to be open for emission.
    fn open_point(&self) -> Result<(FuncId, BlockId), BuildError> {
        let (fid, bid) = self.point.ok_or(BuildError::NoInsertionPoint)?;
        let f = self.module.func(fid).ok_or(BuildError::UnknownFunction)?;
        let block = f
            .blocks
            .get(bid.0 as usize)
            .ok_or_else(|| BuildError::UnknownBlock {
                func: f.name.clone(),
            })?;
        if block.terminator.is_some() {
            return Err(BuildError::BlockAlreadyTerminated {
                func: f.name.clone(),
                block: block.label.clone(),
            });
        }
        Ok((fid, bid))
    }

    fn check_value(&self, fid: FuncId, v: ValueId) -> Result<(), BuildError> {
        let f = self.module.func(fid).ok_or(BuildError::UnknownFunction)?;
        if !f.valid_value(v) {
            return Err(BuildError::UnknownValue {
                func: f.name.clone(),
            });
        }
        Ok(())
    }

    fn push(&mut self, fid: FuncId, bid: BlockId, instr: Instr) {
        let f = self.module.func_mut(fid).expect("checked by open_point");
        f.blocks[bid.0 as usize].instrs.push(instr);
    }

    fn terminate(&mut self, fid: FuncId, bid: BlockId, term: Terminator) {
        let f = self.module.func_mut(fid).expect("checked by open_point");
        f.blocks[bid.0 as usize].terminator = Some(term);
    }

    /// Materialize `text` as a pointer to interned, NUL-terminated,
    /// read-only bytes.
    pub fn const_str(&mut self, text: &str) -> Result<ValueId, BuildError> {
        let (fid, bid) = self.open_point()?;
        let data = self
            .module
            .ctx_mut()
            .intern_cstr(text)
            .ok_or(BuildError::StringWithNul)?;
        let i8t = self.module.ctx_mut().int8();
        let ptr = self.module.ctx_mut().ptr_to(i8t);
        let f = self.module.func_mut(fid).expect("checked by open_point");
        let dst = f.new_value(ptr);
        self.push(fid, bid, Instr::StrConst { dst, data });
        Ok(dst)
    }

    /// Integer constant of type `ty`.
    pub fn const_int(&mut self, ty: TyId, value: i64) -> Result<ValueId, BuildError> {
        let (fid, bid) = self.open_point()?;
        let f = self.module.func_mut(fid).expect("checked by open_point");
        let dst = f.new_value(ty);
        self.push(fid, bid, Instr::IConst { dst, value });
        Ok(dst)
    }

    /// Integer arithmetic. The result takes the left operand's type.
    pub fn binop(
        &mut self,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId, BuildError> {
        let (fid, bid) = self.open_point()?;
        self.check_value(fid, lhs)?;
        self.check_value(fid, rhs)?;
        let f = self.module.func_mut(fid).expect("checked by open_point");
        let ty = f.value_ty(lhs);
        let dst = f.new_value(ty);
        self.push(fid, bid, Instr::BinOp { dst, op, lhs, rhs });
        Ok(dst)
    }

    /// Call `callee`. Returns the result value, or `None` for void callees.
    pub fn call(
        &mut self,
        callee: FuncId,
        args: &[ValueId],
    ) -> Result<Option<ValueId>, BuildError> {
        let (fid, bid) = self.open_point()?;
        for &a in args {
            self.check_value(fid, a)?;
        }
        let ret = self
            .module
            .func(callee)
            .ok_or(BuildError::UnknownFunction)?
            .sig
            .ret;
        let returns_value = self
            .module
            .ctx()
            .abi_type(ret)
            .is_some();
        let f = self.module.func_mut(fid).expect("checked by open_point");
        let dst = if returns_value {
            Some(f.new_value(ret))
        } else {
            None
        };
        self.push(
            fid,
            bid,
            Instr::Call {
                dst,
                callee,
                args: SmallVec::from_slice(args),
            },
        );
        Ok(dst)
    }

    /// Return from the current function.
    pub fn ret(&mut self, value: Option<ValueId>) -> Result<(), BuildError> {
        let (fid, bid) = self.open_point()?;
        if let Some(v) = value {
            self.check_value(fid, v)?;
        }
        self.terminate(fid, bid, Terminator::Return(value));
        Ok(())
    }

    /// Unconditional jump to `target`.
    pub fn jump(&mut self, target: BlockId) -> Result<(), BuildError> {
        let (fid, bid) = self.open_point()?;
        let f = self.module.func(fid).ok_or(BuildError::UnknownFunction)?;
        if !f.valid_block(target) {
            return Err(BuildError::UnknownBlock {
                func: f.name.clone(),
            });
        }
        self.terminate(fid, bid, Terminator::Jump(target));
        Ok(())
    }

    /// Branch on `cond`: nonzero takes `then_block`.
    pub fn branch(
        &mut self,
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    ) -> Result<(), BuildError> {
        let (fid, bid) = self.open_point()?;
        self.check_value(fid, cond)?;
        let f = self.module.func(fid).ok_or(BuildError::UnknownFunction)?;
        if !f.valid_block(then_block) || !f.valid_block(else_block) {
            return Err(BuildError::UnknownBlock {
                func: f.name.clone(),
            });
        }
        self.terminate(
            fid,
            bid,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            },
        );
        Ok(())
    }
}

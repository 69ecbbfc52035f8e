//! Lowering smelt IR to Cranelift IR.

use cranelift_codegen::ir::{types, AbiParam, InstBuilder, Type, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId as ClifFuncId, Module as ClifModule};
use rustc_hash::FxHashMap;

use crate::context::{AbiType, Context};
use crate::error::CompileError;
use crate::ir::{BinOp, FuncId, Function, Instr, Terminator, ValueId};

/// Machine type for an ABI-level type on the target.
pub(crate) fn clif_type(ptr_ty: Type, abi: AbiType) -> Type {
    match abi {
        AbiType::I8 => types::I8,
        AbiType::I32 => types::I32,
        AbiType::I64 => types::I64,
        AbiType::Ptr => ptr_ty,
    }
}

#[inline]
fn var(v: ValueId) -> Variable {
    Variable::from_u32(v.0)
}

/// Translates one verified function into Cranelift IR.
///
/// Every SSA value becomes a Cranelift variable; the frontend inserts block
/// parameters where definitions cross block boundaries. Call sites to
/// variadic externals get a signature built from the actual argument types
/// and go through an indirect call on the resolved address; every other call
/// goes through a declared function reference.
pub(crate) struct FunctionTranslator<'a> {
    module: &'a mut JITModule,
    ctx: &'a Context,
    funcs: &'a [Function],
    clif_ids: &'a FxHashMap<FuncId, ClifFuncId>,
    resolved: &'a FxHashMap<FuncId, *const u8>,
    ptr_ty: Type,
}

impl<'a> FunctionTranslator<'a> {
    pub(crate) fn new(
        module: &'a mut JITModule,
        ctx: &'a Context,
        funcs: &'a [Function],
        clif_ids: &'a FxHashMap<FuncId, ClifFuncId>,
        resolved: &'a FxHashMap<FuncId, *const u8>,
        ptr_ty: Type,
    ) -> Self {
        FunctionTranslator {
            module,
            ctx,
            funcs,
            clif_ids,
            resolved,
            ptr_ty,
        }
    }

    fn value_type(&self, func: &Function, v: ValueId) -> Result<Type, CompileError> {
        let abi = self
            .ctx
            .abi_type(func.value_ty(v))
            .ok_or_else(|| CompileError::codegen("void-typed value survived verification"))?;
        Ok(clif_type(self.ptr_ty, abi))
    }

    pub(crate) fn translate(
        &mut self,
        func: &Function,
        clif_func: &mut cranelift_codegen::ir::Function,
        fb_ctx: &mut FunctionBuilderContext,
    ) -> Result<(), CompileError> {
        let mut builder = FunctionBuilder::new(clif_func, fb_ctx);

        for (i, _) in func.values.iter().enumerate() {
            let ty = self.value_type(func, ValueId(i as u32))?;
            builder.declare_var(Variable::from_u32(i as u32), ty);
        }

        let blocks: Vec<_> = func.blocks.iter().map(|_| builder.create_block()).collect();
        let entry = *blocks
            .first()
            .ok_or_else(|| CompileError::codegen("function with no blocks"))?;
        builder.append_block_params_for_function_params(entry);

        for (i, bb) in func.blocks.iter().enumerate() {
            let cb = blocks[i];
            builder.switch_to_block(cb);

            if i == 0 {
                let incoming = builder.block_params(cb).to_vec();
                for (j, &pv) in func.params.iter().enumerate() {
                    builder.def_var(var(pv), incoming[j]);
                }
            }

            for instr in &bb.instrs {
                self.translate_instr(&mut builder, func, instr)?;
            }

            let term = bb.terminator.as_ref().ok_or_else(|| {
                CompileError::codegen("unterminated block survived verification")
            })?;
            translate_terminator(&mut builder, term, &blocks);
        }

        builder.seal_all_blocks();
        builder.finalize();
        Ok(())
    }

    fn translate_instr(
        &mut self,
        builder: &mut FunctionBuilder,
        func: &Function,
        instr: &Instr,
    ) -> Result<(), CompileError> {
        match instr {
            Instr::StrConst { dst, data } => {
                let addr = self.ctx.cstr_ptr(*data) as i64;
                let v = builder.ins().iconst(self.ptr_ty, addr);
                builder.def_var(var(*dst), v);
            }
            Instr::IConst { dst, value } => {
                let ty = self.value_type(func, *dst)?;
                let v = builder.ins().iconst(ty, *value);
                builder.def_var(var(*dst), v);
            }
            Instr::BinOp { dst, op, lhs, rhs } => {
                let l = builder.use_var(var(*lhs));
                let r = builder.use_var(var(*rhs));
                let v = match op {
                    BinOp::Add => builder.ins().iadd(l, r),
                    BinOp::Sub => builder.ins().isub(l, r),
                    BinOp::Mul => builder.ins().imul(l, r),
                };
                builder.def_var(var(*dst), v);
            }
            Instr::Call { dst, callee, args } => {
                let callee_fn = &self.funcs[callee.0 as usize];
                let vals: Vec<Value> =
                    args.iter().map(|&a| builder.use_var(var(a))).collect();

                let inst = if callee_fn.is_external() && callee_fn.sig.variadic {
                    // Variadic callees get a per-call-site signature built
                    // from the actual argument types; the call goes through
                    // the already resolved address.
                    let mut sig = self.module.make_signature();
                    for &a in args.iter() {
                        let ty = self.value_type(func, a)?;
                        sig.params.push(AbiParam::new(ty));
                    }
                    if let Some(ret) = self.ctx.abi_type(callee_fn.sig.ret) {
                        sig.returns.push(AbiParam::new(clif_type(self.ptr_ty, ret)));
                    }
                    let sig_ref = builder.import_signature(sig);
                    let addr = self.resolved.get(callee).copied().ok_or_else(|| {
                        CompileError::UnresolvedSymbol(callee_fn.name.clone())
                    })?;
                    let callee_ptr = builder.ins().iconst(self.ptr_ty, addr as i64);
                    builder.ins().call_indirect(sig_ref, callee_ptr, &vals)
                } else {
                    let clif_id = self.clif_ids.get(callee).copied().ok_or_else(|| {
                        CompileError::codegen(format!(
                            "callee '{}' was never declared",
                            callee_fn.name
                        ))
                    })?;
                    let func_ref = self.module.declare_func_in_func(clif_id, builder.func);
                    builder.ins().call(func_ref, &vals)
                };

                if let Some(d) = dst {
                    let v = builder
                        .inst_results(inst)
                        .first()
                        .copied()
                        .ok_or_else(|| CompileError::codegen("call produced no result"))?;
                    builder.def_var(var(*d), v);
                }
            }
        }
        Ok(())
    }
}

fn translate_terminator(
    builder: &mut FunctionBuilder,
    term: &Terminator,
    blocks: &[cranelift_codegen::ir::Block],
) {
    match term {
        Terminator::Return(None) => {
            builder.ins().return_(&[]);
        }
        Terminator::Return(Some(v)) => {
            let val = builder.use_var(var(*v));
            builder.ins().return_(&[val]);
        }
        Terminator::Jump(target) => {
            builder.ins().jump(blocks[target.0 as usize], &[]);
        }
        Terminator::Branch {
            cond,
            then_block,
            else_block,
        } => {
            let c = builder.use_var(var(*cond));
            builder.ins().brif(
                c,
                blocks[then_block.0 as usize],
                &[],
                blocks[else_block.0 as usize],
                &[],
            );
        }
    }
}

//! Structural verification, run before any code is generated.
//!
//! The verifier re-checks everything the builder could not: exactly one
//! terminator per block, operand types, call arity against declared
//! signatures, return types, branch targets. A module that passes is safe to
//! lower; a module that fails is rejected whole.

use super::module::Module;
use super::types::{Function, Instr, Terminator};
use crate::context::{Context, TypeKind};
use crate::error::VerificationError;

pub fn verify_module(module: &Module) -> Result<(), VerificationError> {
    let ctx = module.ctx();
    for func in module.funcs() {
        if func.is_external() {
            continue;
        }
        verify_function(ctx, module, func)?;
    }
    Ok(())
}

fn verify_function(
    ctx: &Context,
    module: &Module,
    func: &Function,
) -> Result<(), VerificationError> {
    let name = func.name.as_str();

    if func.sig.variadic {
        return Err(VerificationError::VariadicDefinition {
            func: name.to_string(),
        });
    }
    if func.blocks.is_empty() {
        return Err(VerificationError::EmptyFunction {
            func: name.to_string(),
        });
    }
    if func.params.len() != func.sig.params.len() {
        return Err(VerificationError::Malformed {
            func: name.to_string(),
            message: format!(
                "{} parameter values for {} declared parameters",
                func.params.len(),
                func.sig.params.len()
            ),
        });
    }
    for (i, &p) in func.params.iter().enumerate() {
        if !func.valid_value(p) || func.value_ty(p) != func.sig.params[i] {
            return Err(VerificationError::Malformed {
                func: name.to_string(),
                message: format!("parameter {} has an inconsistent value entry", i),
            });
        }
    }
    for &ty in &func.values {
        if ctx.abi_type(ty).is_none() {
            return Err(VerificationError::Malformed {
                func: name.to_string(),
                message: "void-typed value in the value table".to_string(),
            });
        }
    }

    for block in &func.blocks {
        for instr in &block.instrs {
            verify_instr(ctx, module, func, &block.label, instr)?;
        }
        match &block.terminator {
            None => {
                return Err(VerificationError::MissingTerminator {
                    func: name.to_string(),
                    block: block.label.clone(),
                })
            }
            Some(term) => verify_terminator(ctx, func, &block.label, term)?,
        }
    }
    Ok(())
}

fn is_int(ctx: &Context, func: &Function, v: super::types::ValueId) -> bool {
    matches!(ctx.type_kind(func.value_ty(v)), TypeKind::Int { .. })
}

fn verify_instr(
    ctx: &Context,
    module: &Module,
    func: &Function,
    block: &str,
    instr: &Instr,
) -> Result<(), VerificationError> {
    let name = func.name.as_str();
    let operand_err = |message: String| VerificationError::OperandType {
        func: name.to_string(),
        message,
    };
    let malformed = |message: String| VerificationError::Malformed {
        func: name.to_string(),
        message,
    };

    let check_value = |v: super::types::ValueId| {
        if func.valid_value(v) {
            Ok(())
        } else {
            Err(malformed(format!("value v{} out of range in {}", v.0, block)))
        }
    };

    match instr {
        Instr::StrConst { dst, data } => {
            check_value(*dst)?;
            if !ctx.valid_data(*data) {
                return Err(malformed(format!("string data d{} out of range", data.0)));
            }
            if !matches!(ctx.type_kind(func.value_ty(*dst)), TypeKind::Ptr(_)) {
                return Err(operand_err(format!(
                    "string constant in {} must produce a pointer",
                    block
                )));
            }
        }
        Instr::IConst { dst, value } => {
            check_value(*dst)?;
            let TypeKind::Int { bits } = ctx.type_kind(func.value_ty(*dst)) else {
                return Err(operand_err(format!(
                    "integer constant in {} has a non-integer type",
                    block
                )));
            };
            // Accept anything representable in the width, signed or unsigned.
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << bits) - 1;
                if *value < min || *value > max {
                    return Err(operand_err(format!(
                        "constant {} in {} does not fit in i{}",
                        value, block, bits
                    )));
                }
            }
        }
        Instr::BinOp { dst, op, lhs, rhs } => {
            check_value(*dst)?;
            check_value(*lhs)?;
            check_value(*rhs)?;
            let lt = func.value_ty(*lhs);
            if func.value_ty(*rhs) != lt || func.value_ty(*dst) != lt {
                return Err(operand_err(format!(
                    "{:?} in {} mixes operand types",
                    op, block
                )));
            }
            if !is_int(ctx, func, *lhs) {
                return Err(operand_err(format!(
                    "{:?} in {} applied to a non-integer",
                    op, block
                )));
            }
        }
        Instr::Call { dst, callee, args } => {
            for &a in args.iter() {
                check_value(a)?;
            }
            let callee_fn = module
                .func(*callee)
                .ok_or_else(|| malformed(format!("call in {} to a missing function", block)))?;
            let fixed = callee_fn.sig.params.len();
            let ok_arity = if callee_fn.sig.variadic {
                args.len() >= fixed
            } else {
                args.len() == fixed
            };
            if !ok_arity {
                return Err(VerificationError::ArityMismatch {
                    func: name.to_string(),
                    callee: callee_fn.name.clone(),
                    expected: fixed,
                    got: args.len(),
                });
            }
            for (i, &a) in args.iter().take(fixed).enumerate() {
                if func.value_ty(a) != callee_fn.sig.params[i] {
                    return Err(operand_err(format!(
                        "argument {} of call to '{}' in {} has the wrong type",
                        i, callee_fn.name, block
                    )));
                }
            }
            match (ctx.abi_type(callee_fn.sig.ret), dst) {
                (None, None) => {}
                (None, Some(_)) => {
                    return Err(operand_err(format!(
                        "call to void '{}' in {} binds a result",
                        callee_fn.name, block
                    )))
                }
                (Some(_), None) => {
                    return Err(operand_err(format!(
                        "call to '{}' in {} discards its result binding",
                        callee_fn.name, block
                    )))
                }
                (Some(_), Some(d)) => {
                    check_value(*d)?;
                    if func.value_ty(*d) != callee_fn.sig.ret {
                        return Err(operand_err(format!(
                            "result of call to '{}' in {} has the wrong type",
                            callee_fn.name, block
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn verify_terminator(
    ctx: &Context,
    func: &Function,
    block: &str,
    term: &Terminator,
) -> Result<(), VerificationError> {
    let name = func.name.as_str();
    match term {
        Terminator::Return(value) => {
            let declared = ctx.abi_type(func.sig.ret);
            match (declared, value) {
                (None, None) => Ok(()),
                (Some(_), Some(v)) if func.valid_value(*v) && func.value_ty(*v) == func.sig.ret => {
                    Ok(())
                }
                _ => Err(VerificationError::ReturnTypeMismatch {
                    func: name.to_string(),
                    block: block.to_string(),
                }),
            }
        }
        Terminator::Jump(target) => {
            if func.valid_block(*target) {
                Ok(())
            } else {
                Err(VerificationError::BadBranchTarget {
                    func: name.to_string(),
                    block: block.to_string(),
                })
            }
        }
        Terminator::Branch {
            cond,
            then_block,
            else_block,
        } => {
            if !func.valid_block(*then_block) || !func.valid_block(*else_block) {
                return Err(VerificationError::BadBranchTarget {
                    func: name.to_string(),
                    block: block.to_string(),
                });
            }
            if !func.valid_value(*cond) || !is_int(ctx, func, *cond) {
                return Err(VerificationError::OperandType {
                    func: name.to_string(),
                    message: format!("branch condition in {} is not an integer", block),
                });
            }
            Ok(())
        }
    }
}

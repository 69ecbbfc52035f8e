//! The module: unit of compilation.
//!
//! A module owns its context and every function declared within it. It is
//! created empty, populated through [`IrBuilder`](super::IrBuilder), and then
//! moved into the JIT engine. The move is the ownership-transfer boundary:
//! after `engine.add_module(module)` the binding is gone and the engine may
//! assume the structure never changes again.

use std::fmt;

use rustc_hash::FxHashMap;

use super::types::{FuncId, Function, Instr, Signature, Terminator};
use crate::context::Context;
use crate::error::BuildError;

pub struct Module {
    name: String,
    ctx: Context,
    funcs: Vec<Function>,
    by_name: FxHashMap<String, FuncId>,
}

impl Module {
    /// Create an empty module around `ctx`. The context moves in; everything
    /// the module interns from here on lives and dies with the module.
    pub fn new(ctx: Context, name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ctx,
            funcs: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn funcs(&self) -> &[Function] {
        &self.funcs
    }

    pub fn func(&self, id: FuncId) -> Option<&Function> {
        self.funcs.get(id.0 as usize)
    }

    pub(crate) fn func_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.funcs.get_mut(id.0 as usize)
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    fn insert(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.by_name.insert(func.name.clone(), id);
        self.funcs.push(func);
        id
    }

    /// Declare an external function. The name must be fresh.
    pub fn declare_external(
        &mut self,
        name: &str,
        sig: Signature,
    ) -> Result<FuncId, BuildError> {
        if self.by_name.contains_key(name) {
            return Err(BuildError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        Ok(self.insert(Function::external(name, sig)))
    }

    /// Declare an external function, tolerating an identical prior
    /// declaration. A second call with the same name and signature returns
    /// the original handle; a differing signature is a conflict.
    pub fn get_or_declare_external(
        &mut self,
        name: &str,
        sig: Signature,
    ) -> Result<FuncId, BuildError> {
        if let Some(id) = self.get_function(name) {
            let existing = &self.funcs[id.0 as usize];
            if existing.is_external() && existing.sig == sig {
                return Ok(id);
            }
            return Err(BuildError::SignatureConflict {
                name: name.to_string(),
            });
        }
        Ok(self.insert(Function::external(name, sig)))
    }

    /// Create a function definition. Definitions cannot be variadic.
    pub fn create_function(
        &mut self,
        name: &str,
        sig: Signature,
    ) -> Result<FuncId, BuildError> {
        if self.by_name.contains_key(name) {
            return Err(BuildError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        if sig.variadic {
            return Err(BuildError::VariadicDefinition {
                name: name.to_string(),
            });
        }
        Ok(self.insert(Function::define(name, sig)))
    }

    /// External declarations awaiting symbol resolution.
    pub fn externals(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.funcs
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_external())
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub(crate) fn into_parts(self) -> (Context, Vec<Function>) {
        (self.ctx, self.funcs)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for func in &self.funcs {
            let abi = func.sig.abi(&self.ctx);
            if func.is_external() {
                writeln!(f, "  extern {}{}", func.name, abi)?;
                continue;
            }
            writeln!(f, "  fn {}{} {{", func.name, abi)?;
            for block in &func.blocks {
                writeln!(f, "    {}:", block.label)?;
                for instr in &block.instrs {
                    writeln!(f, "      {}", render_instr(instr, &self.funcs))?;
                }
                match &block.terminator {
                    Some(t) => writeln!(f, "      {}", render_terminator(t, func))?,
                    None => writeln!(f, "      <unterminated>")?,
                }
            }
            writeln!(f, "  }}")?;
        }
        Ok(())
    }
}

fn render_instr(instr: &Instr, funcs: &[Function]) -> String {
    match instr {
        Instr::StrConst { dst, data } => format!("v{} = str d{}", dst.0, data.0),
        Instr::IConst { dst, value } => format!("v{} = const {}", dst.0, value),
        Instr::BinOp { dst, op, lhs, rhs } => {
            format!("v{} = {:?} v{}, v{}", dst.0, op, lhs.0, rhs.0).to_lowercase()
        }
        Instr::Call { dst, callee, args } => {
            let callee_name = funcs
                .get(callee.0 as usize)
                .map(|f| f.name.as_str())
                .unwrap_or("?");
            let args = args
                .iter()
                .map(|a| format!("v{}", a.0))
                .collect::<Vec<_>>()
                .join(", ");
            match dst {
                Some(d) => format!("v{} = call {}({})", d.0, callee_name, args),
                None => format!("call {}({})", callee_name, args),
            }
        }
    }
}

fn render_terminator(term: &Terminator, func: &Function) -> String {
    let label = |b: super::types::BlockId| {
        func.blocks
            .get(b.0 as usize)
            .map(|blk| blk.label.clone())
            .unwrap_or_else(|| format!("b{}", b.0))
    };
    match term {
        Terminator::Return(None) => "ret".to_string(),
        Terminator::Return(Some(v)) => format!("ret v{}", v.0),
        Terminator::Jump(b) => format!("jump {}", label(*b)),
        Terminator::Branch {
            cond,
            then_block,
            else_block,
        } => format!(
            "br v{}, {}, {}",
            cond.0,
            label(*then_block),
            label(*else_block)
        ),
    }
}

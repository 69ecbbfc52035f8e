//! The JIT engine: verify, resolve, lower, link, finalize.

use std::sync::Arc;

use cranelift_codegen::ir::{AbiParam, Signature as ClifSignature, Type, UserFuncName};
use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::FunctionBuilderContext;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{
    default_libcall_names, FuncId as ClifFuncId, Linkage, Module as ClifModule,
};
use rustc_hash::FxHashMap;

use super::artifact::Artifact;
use super::translate::{clif_type, FunctionTranslator};
use crate::context::AbiSignature;
use crate::error::{CompileError, LookupError};
use crate::invoke::CompiledEntry;
use crate::ir::{verify_module, FuncId, Module};
use crate::resolver::SymbolResolver;

/// Optimization level for generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Speed,
}

impl OptLevel {
    fn flag(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub opt: OptLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            opt: OptLevel::Speed,
        }
    }
}

struct ExportedSymbol {
    addr: *const u8,
    sig: AbiSignature,
}

/// JIT compiler and linker.
///
/// Modules are handed over by move and compiled whole: verification, symbol
/// resolution, lowering, and finalization either all succeed or the engine is
/// left exactly as it was. Compiled symbols are looked up by name; the
/// returned entries stay valid as long as the engine lives.
pub struct Engine {
    resolver: SymbolResolver,
    isa: Arc<dyn TargetIsa>,
    artifacts: Vec<Artifact>,
    exports: FxHashMap<String, ExportedSymbol>,
}

impl Engine {
    /// Configure the host target and wrap the resolver.
    pub fn new(resolver: SymbolResolver, config: EngineConfig) -> Result<Self, CompileError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(|e| CompileError::host(e.to_string()))?;
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| CompileError::host(e.to_string()))?;
        flag_builder
            .set("opt_level", config.opt.flag())
            .map_err(|e| CompileError::host(e.to_string()))?;

        let isa_builder = cranelift_native::builder().map_err(CompileError::host)?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| CompileError::host(e.to_string()))?;

        Ok(Engine {
            resolver,
            isa,
            artifacts: Vec::new(),
            exports: FxHashMap::default(),
        })
    }

    /// Compile `module`, consuming it.
    ///
    /// On success its defined functions become visible to [`Engine::lookup`].
    /// On failure nothing is exposed — there are no partial artifacts.
    pub fn add_module(&mut self, module: Module) -> Result<(), CompileError> {
        verify_module(&module)?;

        for func in module.funcs() {
            if !func.is_external() && self.exports.contains_key(&func.name) {
                return Err(CompileError::DuplicateSymbol(func.name.clone()));
            }
        }

        let (ctx, funcs) = module.into_parts();

        // Resolve every external up front; results hold for the module's
        // lifetime. A miss aborts before any code is generated.
        let mut resolved: FxHashMap<FuncId, *const u8> = FxHashMap::default();
        for (i, f) in funcs.iter().enumerate() {
            if f.is_external() {
                let addr = self
                    .resolver
                    .resolve(&f.name)
                    .map_err(|_| CompileError::UnresolvedSymbol(f.name.clone()))?;
                resolved.insert(FuncId(i as u32), addr);
            }
        }

        let mut jit_builder = JITBuilder::with_isa(self.isa.clone(), default_libcall_names());
        for (i, f) in funcs.iter().enumerate() {
            if f.is_external() && !f.sig.variadic {
                jit_builder.symbol(f.name.as_str(), resolved[&FuncId(i as u32)]);
            }
        }
        let mut jit = JITModule::new(jit_builder);
        let ptr_ty = jit.target_config().pointer_type();

        let mut clif_ids: FxHashMap<FuncId, ClifFuncId> = FxHashMap::default();
        for (i, f) in funcs.iter().enumerate() {
            if f.is_external() && f.sig.variadic {
                // Variadic externals are reached through per-call-site
                // signatures; nothing to declare here.
                continue;
            }
            let linkage = if f.is_external() {
                Linkage::Import
            } else {
                Linkage::Export
            };
            let sig = clif_signature(&jit, ptr_ty, &f.sig.abi(&ctx));
            let id = jit
                .declare_function(&f.name, linkage, &sig)
                .map_err(|e| CompileError::codegen(e.to_string()))?;
            clif_ids.insert(FuncId(i as u32), id);
        }

        let mut fb_ctx = FunctionBuilderContext::new();
        for (i, f) in funcs.iter().enumerate() {
            if f.is_external() {
                continue;
            }
            let clif_id = clif_ids[&FuncId(i as u32)];
            let mut cctx = jit.make_context();
            cctx.func.signature = clif_signature(&jit, ptr_ty, &f.sig.abi(&ctx));
            cctx.func.name = UserFuncName::user(0, clif_id.as_u32());

            let mut translator =
                FunctionTranslator::new(&mut jit, &ctx, &funcs, &clif_ids, &resolved, ptr_ty);
            translator.translate(f, &mut cctx.func, &mut fb_ctx)?;

            jit.define_function(clif_id, &mut cctx)
                .map_err(|e| CompileError::codegen(e.to_string()))?;
        }

        jit.finalize_definitions()
            .map_err(|e| CompileError::codegen(e.to_string()))?;

        let mut compiled = Vec::new();
        for (i, f) in funcs.iter().enumerate() {
            if f.is_external() {
                continue;
            }
            let addr = jit.get_finalized_function(clif_ids[&FuncId(i as u32)]);
            compiled.push((
                f.name.clone(),
                ExportedSymbol {
                    addr,
                    sig: f.sig.abi(&ctx),
                },
            ));
        }

        self.artifacts.push(Artifact::new(jit, ctx));
        for (name, sym) in compiled {
            self.exports.insert(name, sym);
        }
        Ok(())
    }

    /// Look up a compiled symbol by name.
    pub fn lookup(&self, name: &str) -> Result<CompiledEntry<'_>, LookupError> {
        let sym = self
            .exports
            .get(name)
            .ok_or_else(|| LookupError::UnknownSymbol(name.to_string()))?;
        Ok(CompiledEntry::new(
            name.to_string(),
            sym.addr,
            sym.sig.clone(),
        ))
    }
}

fn clif_signature(module: &JITModule, ptr_ty: Type, abi: &AbiSignature) -> ClifSignature {
    let mut sig = module.make_signature();
    for &p in &abi.params {
        sig.params.push(AbiParam::new(clif_type(ptr_ty, p)));
    }
    if let Some(r) = abi.ret {
        sig.returns.push(AbiParam::new(clif_type(ptr_ty, r)));
    }
    sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::{BinOp, IrBuilder, Signature};
    use crate::resolver::ResolutionStrategy;

    fn engine() -> Engine {
        let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
        Engine::new(resolver, EngineConfig::default()).expect("host target")
    }

    #[test]
    fn compile_constant_return() {
        let mut module = Module::new(Context::new(), "m");
        let mut b = IrBuilder::new(&mut module);
        let i32t = b.int32();
        let f = b.create_function("answer", Signature::new(vec![], i32t)).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.set_insertion_point(f, entry).unwrap();
        let v = b.const_int(i32t, 42).unwrap();
        b.ret(Some(v)).unwrap();

        let mut engine = engine();
        engine.add_module(module).unwrap();
        let entry = engine.lookup("answer").unwrap();
        let f: unsafe extern "C" fn() -> i32 =
            unsafe { std::mem::transmute(entry.address()) };
        assert_eq!(unsafe { f() }, 42);
    }

    #[test]
    fn compile_function_with_params() {
        let mut module = Module::new(Context::new(), "m");
        let mut b = IrBuilder::new(&mut module);
        let i64t = b.int64();
        let f = b
            .create_function("mul_add", Signature::new(vec![i64t, i64t, i64t], i64t))
            .unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.set_insertion_point(f, entry).unwrap();
        let x = b.func_param(f, 0).unwrap();
        let y = b.func_param(f, 1).unwrap();
        let z = b.func_param(f, 2).unwrap();
        let xy = b.binop(BinOp::Mul, x, y).unwrap();
        let r = b.binop(BinOp::Add, xy, z).unwrap();
        b.ret(Some(r)).unwrap();

        let mut engine = engine();
        engine.add_module(module).unwrap();
        let entry = engine.lookup("mul_add").unwrap();
        let f: unsafe extern "C" fn(i64, i64, i64) -> i64 =
            unsafe { std::mem::transmute(entry.address()) };
        assert_eq!(unsafe { f(6, 7, 8) }, 50);
    }

    #[test]
    fn compile_local_call() {
        let mut module = Module::new(Context::new(), "m");
        let mut b = IrBuilder::new(&mut module);
        let i32t = b.int32();

        let helper = b.create_function("seven", Signature::new(vec![], i32t)).unwrap();
        let hb = b.append_block(helper, "entry").unwrap();
        b.set_insertion_point(helper, hb).unwrap();
        let seven = b.const_int(i32t, 7).unwrap();
        b.ret(Some(seven)).unwrap();

        let main = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
        let mb = b.append_block(main, "entry").unwrap();
        b.set_insertion_point(main, mb).unwrap();
        let got = b.call(helper, &[]).unwrap().unwrap();
        let six = b.const_int(i32t, 6).unwrap();
        let r = b.binop(BinOp::Mul, got, six).unwrap();
        b.ret(Some(r)).unwrap();

        let mut engine = engine();
        engine.add_module(module).unwrap();
        let entry = engine.lookup("main").unwrap();
        let f: unsafe extern "C" fn() -> i32 =
            unsafe { std::mem::transmute(entry.address()) };
        assert_eq!(unsafe { f() }, 42);
    }

    #[test]
    fn branch_selects_the_right_arm() {
        let mut module = Module::new(Context::new(), "m");
        let mut b = IrBuilder::new(&mut module);
        let i32t = b.int32();

        for (name, cond, expect) in [("taken", 1, 10), ("not_taken", 0, 20)] {
            let f = b.create_function(name, Signature::new(vec![], i32t)).unwrap();
            let entry = b.append_block(f, "entry").unwrap();
            let then_b = b.append_block(f, "then").unwrap();
            let else_b = b.append_block(f, "else").unwrap();
            b.set_insertion_point(f, entry).unwrap();
            let c = b.const_int(i32t, cond).unwrap();
            b.branch(c, then_b, else_b).unwrap();
            b.set_insertion_point(f, then_b).unwrap();
            let v = b.const_int(i32t, 10).unwrap();
            b.ret(Some(v)).unwrap();
            b.set_insertion_point(f, else_b).unwrap();
            let v = b.const_int(i32t, 20).unwrap();
            b.ret(Some(v)).unwrap();
            let _ = expect;
        }

        let mut engine = engine();
        engine.add_module(module).unwrap();
        for (name, expect) in [("taken", 10), ("not_taken", 20)] {
            let entry = engine.lookup(name).unwrap();
            let f: unsafe extern "C" fn() -> i32 =
                unsafe { std::mem::transmute(entry.address()) };
            assert_eq!(unsafe { f() }, expect, "{}", name);
        }
    }

    #[test]
    fn unresolved_external_aborts_compilation() {
        let mut module = Module::new(Context::new(), "m");
        let mut b = IrBuilder::new(&mut module);
        let i32t = b.int32();
        let ext = b
            .declare_external("nowhere", Signature::new(vec![], i32t))
            .unwrap();
        let f = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.set_insertion_point(f, entry).unwrap();
        let r = b.call(ext, &[]).unwrap().unwrap();
        b.ret(Some(r)).unwrap();

        let mut engine = engine();
        match engine.add_module(module) {
            Err(CompileError::UnresolvedSymbol(name)) => assert_eq!(name, "nowhere"),
            other => panic!("expected UnresolvedSymbol, got {:?}", other),
        }
        // Nothing was exposed.
        assert!(engine.lookup("main").is_err());
    }

    #[test]
    fn verification_failure_reports_before_codegen() {
        let mut module = Module::new(Context::new(), "m");
        let mut b = IrBuilder::new(&mut module);
        let i32t = b.int32();
        let f = b.create_function("broken", Signature::new(vec![], i32t)).unwrap();
        let entry = b.append_block(f, "entry").unwrap();
        b.set_insertion_point(f, entry).unwrap();
        b.const_int(i32t, 1).unwrap();
        // No terminator.

        let mut engine = engine();
        assert!(matches!(
            engine.add_module(module),
            Err(CompileError::Verification(_))
        ));
    }

    #[test]
    fn independent_modules_share_one_engine() {
        let build = |name: &str, value: i64| {
            let mut module = Module::new(Context::new(), name);
            let mut b = IrBuilder::new(&mut module);
            let i32t = b.int32();
            let f = b.create_function(name, Signature::new(vec![], i32t)).unwrap();
            let entry = b.append_block(f, "entry").unwrap();
            b.set_insertion_point(f, entry).unwrap();
            let v = b.const_int(i32t, value).unwrap();
            b.ret(Some(v)).unwrap();
            module
        };

        let mut engine = engine();
        engine.add_module(build("first", 1)).unwrap();
        engine.add_module(build("second", 2)).unwrap();
        for (name, expect) in [("first", 1), ("second", 2)] {
            let entry = engine.lookup(name).unwrap();
            let f: unsafe extern "C" fn() -> i32 =
                unsafe { std::mem::transmute(entry.address()) };
            assert_eq!(unsafe { f() }, expect);
        }
    }

    #[test]
    fn duplicate_symbol_across_modules_is_rejected() {
        let build = || {
            let mut module = Module::new(Context::new(), "m");
            let mut b = IrBuilder::new(&mut module);
            let i32t = b.int32();
            let f = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
            let entry = b.append_block(f, "entry").unwrap();
            b.set_insertion_point(f, entry).unwrap();
            let v = b.const_int(i32t, 0).unwrap();
            b.ret(Some(v)).unwrap();
            module
        };

        let mut engine = engine();
        engine.add_module(build()).unwrap();
        assert!(matches!(
            engine.add_module(build()),
            Err(CompileError::DuplicateSymbol(_))
        ));
    }
}

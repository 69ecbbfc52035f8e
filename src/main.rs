//! Demo driver: build the hello program in memory, JIT it, run it.
//!
//! Exit code is the entry function's return value; pipeline failure before
//! invocation exits with the reserved code instead.

use smelt::{
    run_module, AbiSignature, AbiType, BuildError, Context, ErrorPolicy, IrBuilder, Module,
    PipelineOptions, ResolutionStrategy, ReturnValue, Signature, SymbolResolver,
    FAILURE_EXIT_CODE,
};

/// Declare `printf(ptr, ...) -> i32`, then define
/// `main() -> i32 { printf("Hello from LLVM!\n"); 0 }`.
fn build_hello(ctx: Context) -> Result<Module, BuildError> {
    let mut module = Module::new(ctx, "printf_module");
    let mut b = IrBuilder::new(&mut module);

    let i32t = b.int32();
    let i8t = b.int8();
    let bytes = b.ptr_to(i8t);
    let printf = b.declare_external("printf", Signature::variadic(vec![bytes], i32t))?;

    let main_fn = b.create_function("main", Signature::new(vec![], i32t))?;
    let entry = b.append_block(main_fn, "entry")?;
    b.set_insertion_point(main_fn, entry)?;
    let greeting = b.const_str("Hello from LLVM!\n")?;
    b.call(printf, &[greeting])?;
    let zero = b.const_int(i32t, 0)?;
    b.ret(Some(zero))?;

    Ok(module)
}

fn main() {
    let module = match build_hello(Context::new()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("smelt: build: {}", e);
            std::process::exit(FAILURE_EXIT_CODE);
        }
    };

    // printf lives in the host's libc; opt into the process symbol table.
    let resolver = SymbolResolver::new(ResolutionStrategy::ProcessWide);

    let options = PipelineOptions {
        policy: ErrorPolicy::Abort,
        ..PipelineOptions::default()
    };
    let expected = AbiSignature::nullary(Some(AbiType::I32));

    match run_module(module, resolver, &options, "main", &expected) {
        Ok(ReturnValue::Int32(code)) => std::process::exit(code),
        Ok(_) => std::process::exit(0),
        Err(e) => {
            // Unreachable under ErrorPolicy::Abort; kept for the Propagate case.
            eprintln!("smelt: {}", e);
            std::process::exit(FAILURE_EXIT_CODE);
        }
    }
}

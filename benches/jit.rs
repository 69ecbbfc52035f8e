use criterion::{black_box, criterion_group, criterion_main, Criterion};

use smelt::{
    AbiSignature, AbiType, BinOp, Context, Engine, EngineConfig, IrBuilder, Module,
    ResolutionStrategy, ReturnValue, SymbolResolver,
};

/// Build a small arithmetic entry so the bench exercises construction,
/// lowering, and linking without touching host symbols.
fn build_module() -> Module {
    let mut module = Module::new(Context::new(), "bench");
    let mut b = IrBuilder::new(&mut module);
    let i64t = b.int64();
    let f = b
        .create_function("main", smelt::Signature::new(vec![], i64t))
        .unwrap();
    let entry = b.append_block(f, "entry").unwrap();
    b.set_insertion_point(f, entry).unwrap();
    let mut acc = b.const_int(i64t, 1).unwrap();
    for i in 2..=10 {
        let step = b.const_int(i64t, i).unwrap();
        acc = b.binop(BinOp::Add, acc, step).unwrap();
    }
    b.ret(Some(acc)).unwrap();
    module
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("build_and_compile", |b| {
        b.iter(|| {
            let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
            let mut engine = Engine::new(resolver, EngineConfig::default()).unwrap();
            engine.add_module(black_box(build_module())).unwrap();
            engine.lookup("main").unwrap().address()
        });
    });
}

fn bench_invoke(c: &mut Criterion) {
    let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    let mut engine = Engine::new(resolver, EngineConfig::default()).unwrap();
    engine.add_module(build_module()).unwrap();
    let entry = engine.lookup("main").unwrap();
    let expected = AbiSignature::nullary(Some(AbiType::I64));

    c.bench_function("invoke_entry", |b| {
        b.iter(|| {
            let ret = entry.invoke(black_box(&expected)).unwrap();
            assert_eq!(ret, ReturnValue::Int64(55));
            ret
        });
    });
}

criterion_group!(benches, bench_compile, bench_invoke);
criterion_main!(benches);

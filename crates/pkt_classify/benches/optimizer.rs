//! Optimizer and compiler performance benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pkt_classify::bytecode::compressed::CompressedProgram;
use pkt_classify::bytecode::jump::Jump;
use pkt_classify::bytecode::program::Program;
use pkt_classify::bytecode::tree::Combinator;
use pkt_classify::config::OptimizeConfig;

/// One `ethertype && proto && port` pattern per output, alternating TCP
/// and UDP so the dominator pass has shared prefixes to exploit.
fn patterns(count: u32) -> Program {
    let mut prog = Program::new();
    let mut tree = prog.init_subtree();
    prog.start_subtree(&mut tree);
    for idx in 0..count {
        let proto = if idx % 2 == 0 { 6 } else { 17 };
        prog.start_subtree(&mut tree);
        prog.add_insn(&mut tree, 12, 0x0800_0000, 0xFFFF_0000);
        prog.add_insn(&mut tree, 20, proto, 0x0000_00FF);
        prog.add_insn(&mut tree, 36, (1000 + idx) << 16, 0xFFFF_0000);
        prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(idx % 8), Jump::Failure);
    }
    prog.finish_subtree(&mut tree, Combinator::Or, Jump::Never, Jump::Never);
    prog
}

/// Benchmark the optimizer pipeline as the pattern count grows.
fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer/optimize");

    for count in [4, 16, 64, 128] {
        let prog = patterns(count);
        group.throughput(Throughput::Elements(prog.len() as u64));
        group.bench_with_input(BenchmarkId::new("patterns", count), &prog, |b, prog| {
            b.iter(|| {
                let mut prog = prog.clone();
                prog.optimize_with(black_box(&OptimizeConfig::default()))
                    .expect("valid program");
                prog
            })
        });
    }

    group.finish();
}

/// Benchmark the dominator list bound.
fn bench_dominator_lists(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer/dominator_lists");
    let prog = patterns(64);

    for max_lists in [1, 4, 16] {
        let config = OptimizeConfig::new().with_max_dominator_lists(max_lists);
        group.bench_with_input(BenchmarkId::new("max", max_lists), &config, |b, config| {
            b.iter(|| {
                let mut prog = prog.clone();
                prog.optimize_with(black_box(config)).expect("valid program");
                prog
            })
        });
    }

    group.finish();
}

/// Benchmark compression of optimized programs.
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizer/compile");

    for count in [16, 128] {
        let mut prog = patterns(count);
        prog.optimize_with(&OptimizeConfig::default())
            .expect("valid program");
        group.bench_with_input(BenchmarkId::new("patterns", count), &prog, |b, prog| {
            b.iter(|| CompressedProgram::compile(black_box(prog)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_optimize, bench_dominator_lists, bench_compile);

criterion_main!(benches);

//! Matching performance benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pkt_classify::bytecode::compressed::CompressedProgram;
use pkt_classify::bytecode::jump::Jump;
use pkt_classify::bytecode::program::Program;
use pkt_classify::bytecode::tree::Combinator;
use pkt_classify::config::{CompileConfig, OFFSET_MAX, OffsetOrder};
use pkt_classify::execution::Classify;

/// `ethertype == IP && proto == TCP && dport == port` for each port.
fn port_filter(ports: u32) -> Program {
    let mut prog = Program::new();
    let mut tree = prog.init_subtree();
    prog.start_subtree(&mut tree);
    for port in 0..ports {
        prog.start_subtree(&mut tree);
        prog.add_insn(&mut tree, 12, 0x0800_0000, 0xFFFF_0000);
        prog.add_insn(&mut tree, 20, 0x0000_0006, 0x0000_00FF);
        prog.add_insn(&mut tree, 36, (1000 + port) << 16, 0xFFFF_0000);
        prog.finish_subtree(&mut tree, Combinator::And, Jump::Output(0), Jump::Failure);
    }
    prog.finish_subtree(&mut tree, Combinator::Or, Jump::Never, Jump::Never);
    prog.optimize(&OffsetOrder::identity(), OFFSET_MAX)
        .expect("valid program");
    prog
}

fn tcp_packet(dport: u16, len: usize) -> Vec<u8> {
    let mut packet = vec![0u8; len];
    packet[12..14].copy_from_slice(&[0x08, 0x00]);
    packet[23] = 6;
    packet[36..38].copy_from_slice(&dport.to_be_bytes());
    packet
}

/// Benchmark the compressed program on full-size packets.
fn bench_fast_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching/fast_path");
    let prog = port_filter(4);
    let zprog = CompressedProgram::compile(&prog).expect("compiles");
    let packet = tcp_packet(1003, 60);

    group.bench_function("compressed", |b| {
        b.iter(|| zprog.classify(black_box(&packet)))
    });
    group.bench_function("program", |b| b.iter(|| prog.classify(black_box(&packet))));

    group.finish();
}

/// Benchmark packets shorter than the safe length.
fn bench_short_packets(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching/short");
    let zprog = CompressedProgram::compile(&port_filter(4)).expect("compiles");
    let packet = tcp_packet(1003, 60);

    for len in [0, 14, 24, 37] {
        group.bench_with_input(BenchmarkId::new("len", len), &packet[..len], |b, packet| {
            b.iter(|| zprog.classify(black_box(packet)))
        });
    }

    group.finish();
}

/// Benchmark value-set lookups, linear against binary search.
fn bench_value_sets(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching/value_set");

    for ports in [4, 16, 64, 256] {
        let prog = port_filter(ports);
        let packet = tcp_packet(1000 + ports as u16 - 1, 60);
        group.throughput(Throughput::Elements(1));

        for (name, config) in [("linear", CompileConfig::linear()), ("bisect", CompileConfig::new())] {
            let zprog = CompressedProgram::compile_with(&prog, config).expect("compiles");
            group.bench_with_input(BenchmarkId::new(name, ports), &ports, |b, _| {
                b.iter(|| zprog.classify(black_box(&packet)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_fast_path, bench_short_packets, bench_value_sets);

criterion_main!(benches);

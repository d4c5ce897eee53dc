use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use stap_to_duckdb::forkmap::ForkMap;
use stap_to_duckdb::parser::{parse_arguments, parse_line};
use stap_to_duckdb::stream::StapParser;
use std::io::Cursor;

fn benchmark_parse_line(c: &mut Criterion) {
    let samples = vec![
        (
            "simple",
            "Thu May  7 14:58:43 2015.390178 python@7f798cb95240[2114] close(6) = 0 (0)",
        ),
        (
            "string",
            "Thu May  7 14:58:43 2015.390201 python@7f798cb95240[2114] open(\"/etc/ld.so.cache\", O_RDONLY|O_CLOEXEC) = 3 (0)",
        ),
        (
            "execve",
            "Thu May  7 14:58:43 2015.390500 bash@7f798cb97000[2115] execve(\"/bin/ls\", [\"ls\", \"-la\"], [/* 20 vars */]) = 0 (0)",
        ),
        (
            "escapes",
            "Thu May  7 14:58:43 2015.390201 bash@7f798cb95240[2114] read(3, \"\\177ELF\\002\\001\\001\\n\", 832) = 832 (0)",
        ),
    ];

    let mut group = c.benchmark_group("parse_line");

    for (name, sample) in samples.iter() {
        group.throughput(Throughput::Bytes(sample.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), sample, |b, s| {
            b.iter(|| {
                black_box(parse_line(s).ok());
            });
        });
    }
    group.finish();
}

fn benchmark_parse_arguments(c: &mut Criterion) {
    let samples = vec![
        ("scalars", "3, 0x7ffd1c2b3c4c, 0, 0x0"),
        ("strings", "\"/usr/lib/x86_64-linux-gnu/libc.so.6\", O_RDONLY, \"mode\", 0644"),
        ("arrays", "[\"sh\", \"-c\", \"echo hi\"], [1, 2, 3], [/* 42 vars */]"),
    ];

    let mut group = c.benchmark_group("parse_arguments");

    for (name, sample) in samples.iter() {
        group.throughput(Throughput::Bytes(sample.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), sample, |b, s| {
            b.iter(|| {
                black_box(parse_arguments(s));
            });
        });
    }
    group.finish();
}

fn benchmark_stream(c: &mut Criterion) {
    // Simulate replaying a realistic trace
    let lines = [
        "Thu May  7 14:58:43 2015.390178 bash@7f798cb95240[2114] open(\"/etc/ld.so.cache\", O_RDONLY|O_CLOEXEC) = 3 (0)",
        "Thu May  7 14:58:43 2015.390250 bash@7f798cb95240[2114] close(3) = 0 (0)",
        "Thu May  7 14:58:43 2015.390500 bash@7f798cb97000[2115] execve(\"/bin/ls\", [\"ls\", \"-la\"], [/* 20 vars */]) = 0 (0)",
        "Thu May  7 14:58:43 2015.390700 ls@7f00aa123456[2116] write(1, \"total 0\\n\", 8) = 8 (0)",
        "Thu May  7 14:58:44 2015.000010 bash@7f798cb95240[2114] wait4(2115, 0x7ffd1c2b3c4c, 0, 0x0) = 2115 (0)",
    ];
    let text = format!("{}\n", lines.join("\n")).repeat(20);
    let parser = StapParser::new(Cursor::new(text.clone().into_bytes()));

    let mut group = c.benchmark_group("stream");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("replay_100_lines", |b| {
        b.iter(|| {
            for event in parser.iter() {
                let _ = black_box(event);
            }
        });
    });

    group.finish();
}

fn benchmark_fork_map(c: &mut Criterion) {
    let text: String = (1..=1000)
        .map(|i| {
            format!(
                "[ {}.000000] task {}@0xffff88003d4a8000 forked to {}@0xffff88003d4ae000\n",
                i,
                i,
                i + 1
            )
        })
        .collect();

    c.bench_function("fork_map_1000_records", |b| {
        b.iter(|| black_box(ForkMap::parse(&text)));
    });
}

criterion_group!(
    benches,
    benchmark_parse_line,
    benchmark_parse_arguments,
    benchmark_stream,
    benchmark_fork_map
);
criterion_main!(benches);

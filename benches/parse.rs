use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const TESTS: [&str; 6] = [
    "age gte 30",
    "surname eq 'Walker' and name startswith 'J'",
    "ident1 startswith 'text' or not (ident2 gte 1 and ident2 lte 10)",
    "size gte 2000 and not(create_time lt #now) // stale entries",
    "elapsed lt (#now sub #duration('PT2H')) and start gte '2020-03-18T12:30:00'",
    "a eq 1 and b between 2 and 3 or c contains 'x' and d is not null",
];

fn parse_expressions() {
    let mut num_expressions = 0;
    for test in TESTS {
        match espressopp::parser::parse(test) {
            Ok(grammar) => num_expressions += grammar.expressions().len(),
            Err(e) => panic!("Unexpected: {e}"),
        }
    }
    black_box(num_expressions);
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("parse some expressions", |b| b.iter(parse_expressions));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

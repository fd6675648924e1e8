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

fn lex_expressions() {
    use espressopp::lex::Lexer;
    // track the tokens so the loop below doesn't get optimized out
    let mut num_tokens: u64 = 0;
    for test in TESTS {
        let mut lexer = Lexer::new(test);
        loop {
            match lexer.next_token() {
                Ok(Some(_)) => num_tokens += 1,
                Ok(None) => break,
                Err(e) => panic!("Unexpected: {e}"),
            }
        }
    }
    black_box(num_tokens);
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("lex some expressions", |b| b.iter(lex_expressions));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

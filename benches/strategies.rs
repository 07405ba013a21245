use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use racecount::backends::{self, BackendConfig, CounterBackend, CounterType, Method};
use racecount::retry::RetryPolicy;

const NUM_THREADS: usize = 8;
const ITERATIONS_PER_THREAD: usize = 10_000;

fn counter(method: Method) -> Arc<dyn CounterBackend> {
    let config = BackendConfig::new(CounterType::Memory)
        .with_method(method)
        .with_retry_policy(
            RetryPolicy::new()
                .with_max_attempts(1000)
                .with_base_delay(Duration::from_micros(10))
                .with_max_delay(Duration::from_millis(1)),
        );
    Arc::from(backends::setup(&config).unwrap())
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_increment");
    group.sample_size(20);

    for method in Method::ALL {
        group.bench_function(
            BenchmarkId::new(
                method.as_str(),
                format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD),
            ),
            |b| {
                b.iter(|| {
                    let counter = counter(method);
                    let mut handles = vec![];

                    for _ in 0..NUM_THREADS {
                        let counter_clone = Arc::clone(&counter);
                        let handle = thread::spawn(move || {
                            for _ in 0..ITERATIONS_PER_THREAD {
                                counter_clone.increment();
                            }
                        });
                        handles.push(handle);
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }

                    black_box(counter.read())
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_strategies);
criterion_main!(benches);

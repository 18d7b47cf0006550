use std::sync::{Arc, Mutex};
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracciato::events::EventBuffer;
use tracciato::strings::StringTable;

const NUM_THREADS: usize = 8;
const RECORDS_PER_THREAD: u32 = 1_000_000;

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_append");

    group.bench_function(
        BenchmarkId::new(
            "Producer (per-thread chunks)",
            format!("{}threads x {}records", NUM_THREADS, RECORDS_PER_THREAD),
        ),
        |b| {
            b.iter(|| {
                let strings = Arc::new(StringTable::new());
                let mut handles = vec![];

                for _ in 0..NUM_THREADS {
                    let buffer = EventBuffer::new(Arc::clone(&strings), 64 * 1024);
                    let handle = thread::spawn(move || {
                        let mut producer = buffer.producer().unwrap();
                        for i in 0..RECORDS_PER_THREAD {
                            producer.append(&[1, i]).unwrap();
                        }
                        drop(producer);
                        buffer.published_words()
                    });
                    handles.push(handle);
                }

                let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
                black_box(total)
            })
        },
    );

    group.bench_function(
        BenchmarkId::new(
            "Mutex<Vec<u32>> (shared)",
            format!("{}threads x {}records", NUM_THREADS, RECORDS_PER_THREAD),
        ),
        |b| {
            b.iter(|| {
                let log = Arc::new(Mutex::new(Vec::new()));
                let mut handles = vec![];

                for _ in 0..NUM_THREADS {
                    let log = Arc::clone(&log);
                    let handle = thread::spawn(move || {
                        for i in 0..RECORDS_PER_THREAD {
                            log.lock().unwrap().extend_from_slice(&[1, i]);
                        }
                    });
                    handles.push(handle);
                }

                for handle in handles {
                    handle.join().unwrap();
                }

                black_box(log.lock().unwrap().len())
            })
        },
    );

    group.finish();
}

criterion_group!(benches, bench_record);
criterion_main!(benches);

//! Threaded torture test: noise-maker threads record events as fast as they
//! can while a save thread repeatedly snapshots the whole recorder.
//!
//! Run with:
//! ```bash
//! cargo run --example torture --features demo -- --help
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracciato::events::Producer;
use tracciato::reader::decode_chunks;
use tracciato::recorder::{Recorder, RecorderConfig};
use tracciato::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Torture test for tracciato - concurrent recording and saving.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of noise-maker threads (default: available cores - 1)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Number of save iterations
    #[arg(short, long, default_value = "751")]
    iterations: usize,

    /// Save to a file every N iterations (in-memory saves otherwise)
    #[arg(long, default_value = "250")]
    file_every: usize,

    /// Directory for trace files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Chunk size in bytes
    #[arg(long, default_value = "65536")]
    chunk_size: usize,

    /// Pause between saves, in milliseconds
    #[arg(long, default_value = "10")]
    pause_ms: u64,

    /// Print the summary of file saves as JSON
    #[arg(long)]
    json: bool,
}

/// Appends one record, counting failures instead of stopping.
fn record(producer: &mut Producer, words: &[u32], failures: &AtomicUsize) {
    if let Err(err) = producer.append(words) {
        error!(%err, "append failed");
        failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Records an enter/leave pair around `f`.
fn scope(
    producer: &mut Producer,
    failures: &AtomicUsize,
    name: u32,
    leave: u32,
    args: [u32; 2],
    f: impl FnOnce(&mut Producer),
) {
    record(producer, &[name, args[0], args[1]], failures);
    f(producer);
    record(producer, &[leave], failures);
}

fn noise_maker(
    recorder: Arc<Recorder>,
    stop: Arc<AtomicBool>,
    failures: Arc<AtomicUsize>,
    thread_number: u32,
) -> Result<()> {
    let mut producer = recorder.register_thread(&format!("NoiseMaker{thread_number}"))?;
    let event = producer.intern("NoiseMaker1#Loop: thread_number, i")?;
    let scope100 = producer.intern("NoiseMaker1#Scope100: thread_number, i")?;
    let scope400 = producer.intern("NoiseMaker1#Scope400: thread_number, i")?;
    let scope1600 = producer.intern("NoiseMaker1#Scope1600: thread_number, i")?;
    let leave = producer.intern("wtf.scope#leave")?;
    let failures = &*failures;

    let mut i = 0u32;
    while !stop.load(Ordering::Relaxed) {
        record(&mut producer, &[event, thread_number, i], failures);
        thread::sleep(Duration::from_micros(5));
        if i % 100 == 0 {
            scope(&mut producer, failures, scope100, leave, [thread_number, i], |p| {
                thread::sleep(Duration::from_micros(10));
                if i % 400 == 0 {
                    scope(p, failures, scope400, leave, [thread_number, i], |p| {
                        thread::sleep(Duration::from_micros(10));
                        if i % 1600 == 0 {
                            scope(p, failures, scope1600, leave, [thread_number, i], |_| {
                                thread::sleep(Duration::from_micros(10));
                            });
                        }
                    });
                }
            });
        }
        i = i.wrapping_add(1);
    }
    Ok(())
}

/// Returns the number of failed saves.
fn save_loop(recorder: &Recorder, args: &Args, append_failures: &AtomicUsize) -> Result<usize> {
    let mut producer = recorder.register_thread("SaveThread")?;
    let to_file = producer.intern("SaveThread#ToFile: i")?;
    let dummy = producer.intern("SaveThread#Dummy: i")?;
    let leave = producer.intern("wtf.scope#leave")?;

    let mut failures = 0;
    for i in 0..args.iterations {
        if i > 0 && args.file_every > 0 && i % args.file_every == 0 {
            record(&mut producer, &[to_file, i as u32], append_failures);
            let path = args.out_dir.join(format!("tmp_threaded_torture_test_{i}.wtf-trace"));
            match recorder.save_to_file(&path) {
                Ok(summary) => {
                    info!(path = %path.display(), bytes = summary.total_bytes(), "saved");
                    if args.json {
                        match summary.to_json(true) {
                            Ok(json) => println!("{json}"),
                            Err(err) => error!(%err, "failed to render summary"),
                        }
                    }
                }
                Err(err) => {
                    error!(path = %path.display(), %err, "save_to_file failed");
                    failures += 1;
                }
            }
        } else {
            record(&mut producer, &[dummy, i as u32], append_failures);
            let mut out = Vec::new();
            match recorder.save(&mut out).and_then(|_| decode_chunks(&out).map(|_| ())) {
                Ok(()) => {}
                Err(err) => {
                    error!(%err, "save failed");
                    failures += 1;
                }
            }
        }
        record(&mut producer, &[leave], append_failures);
        thread::sleep(Duration::from_millis(args.pause_ms));
    }
    Ok(failures)
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let thread_count = args.threads.unwrap_or_else(|| {
        let cores = thread::available_parallelism().map_or(1, |n| n.get());
        // Give one core to the save thread if we have it.
        if cores > 1 {
            cores - 1
        } else {
            cores
        }
    });
    info!(threads = thread_count, "running torture test");

    let recorder = Arc::new(Recorder::new(
        RecorderConfig::default().with_chunk_size_bytes(args.chunk_size),
    ));
    let stop = Arc::new(AtomicBool::new(false));
    let append_failures = Arc::new(AtomicUsize::new(0));

    let noise_makers: Vec<_> = (0..thread_count as u32)
        .map(|n| {
            let recorder = Arc::clone(&recorder);
            let stop = Arc::clone(&stop);
            let append_failures = Arc::clone(&append_failures);
            thread::spawn(move || noise_maker(recorder, stop, append_failures, n))
        })
        .collect();

    let saved = save_loop(&recorder, &args, &append_failures);
    stop.store(true, Ordering::Relaxed);

    let mut ok = true;
    for handle in noise_makers {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(%err, "noise maker failed");
                ok = false;
            }
            Err(_) => {
                error!("noise maker panicked");
                ok = false;
            }
        }
    }

    let save_failures = match saved {
        Ok(failures) => failures,
        Err(err) => {
            error!(%err, "save thread failed");
            ok = false;
            0
        }
    };
    let append_failures = append_failures.load(Ordering::Relaxed);
    if !ok || save_failures > 0 || append_failures > 0 {
        error!(save_failures, append_failures, "errors were reported");
        return ExitCode::FAILURE;
    }
    info!("done");
    ExitCode::SUCCESS
}

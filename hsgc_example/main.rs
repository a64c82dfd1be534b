use clap::Parser;

use std::ffi::c_void;

use hsgc::{
    ffi::{self, hsgc_alloc, hsgc_fini, hsgc_register_root, hsgc_unregister_root},
    CollectionStats, HeapOptions, HeapOptionsBuilder,
};

/// Drive the process-wide heap through its C ABI the way a host program would, printing what
/// each collection reclaims.
#[derive(Parser)]
#[command(about)]
pub struct Args {
    /// Number of allocate-then-collect rounds
    #[arg(long, default_value_t = 5)]
    pub rounds: usize,

    /// Objects allocated per round
    #[arg(long, default_value_t = 1000)]
    pub objects: usize,

    /// Root every Nth object of a round. Zero roots nothing.
    #[arg(long, default_value_t = 10)]
    pub root_every: usize,

    /// Payload size of each object, in bytes
    #[arg(long, default_value_t = 64)]
    pub payload_size: usize,

    /// Cap on live payload bytes. Exceeding it terminates the process.
    #[arg(long)]
    pub heap_limit: Option<usize>,

    /// Log every collection at info level
    #[arg(long, default_value_t = false)]
    pub log_collections: bool,
}

fn options_from_args(args: &Args) -> HeapOptions {
    HeapOptionsBuilder::new()
        .heap_limit(args.heap_limit)
        .log_collections(args.log_collections)
        .build()
}

pub fn print_error_message_and_exit(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn collect_global() -> CollectionStats {
    match ffi::with_global_heap(|heap| heap.collect()) {
        Some(stats) => stats,
        None => print_error_message_and_exit("heap was torn down during the run"),
    }
}

/// Allocate one round of objects, keeping every `root_every`th one reachable from a boxed slot.
fn run_round(args: &Args) -> Vec<Box<*mut c_void>> {
    let mut slots = Vec::new();

    for i in 0..args.objects {
        let object = hsgc_alloc(args.payload_size);

        if args.root_every != 0 && i % args.root_every == 0 {
            let mut slot = Box::new(object);
            unsafe { hsgc_register_root(&mut *slot) };
            slots.push(slot);
        }
    }

    slots
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    ffi::init_with_options(options_from_args(&args));

    tracing::info!(
        rounds = args.rounds,
        objects = args.objects,
        root_every = args.root_every,
        payload_size = args.payload_size,
        "starting workload"
    );

    for round in 0..args.rounds {
        let mut slots = run_round(&args);
        let stats = collect_global();

        println!(
            "round {round}: marked {} freed {} ({} bytes), {} live",
            stats.objects_marked, stats.objects_freed, stats.bytes_freed, stats.objects_surviving
        );

        for slot in &mut slots {
            hsgc_unregister_root(&mut **slot);
        }
    }

    // Everything rooted in the last round is unrooted now
    let stats = collect_global();
    println!("final collection freed {} objects", stats.objects_freed);

    if let Some(stats) = ffi::with_global_heap(|heap| heap.stats()) {
        println!("{stats:?}");
    }

    hsgc_fini();
}

use std::hash::BuildHasherDefault;
use std::hash::Hasher;

use clap::Parser;
use probe_hash::HashMap;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::Level;

#[derive(Parser, Debug)]
struct Args {
    /// How many random numbers to count.
    #[arg(short = 'n', long = "count", default_value_t = 100)]
    count: usize,

    /// Numbers are drawn from `0..range`.
    #[arg(short = 'r', long = "range", default_value_t = 16)]
    range: u64,

    #[arg(short = 's', long = "seed", default_value_t = 0)]
    seed: u64,

    /// Initial slot count of the map.
    #[arg(long = "slots", default_value_t = probe_hash::DEFAULT_SLOTS)]
    slots: usize,

    /// Hash numbers to themselves instead of using the default hasher.
    #[arg(long = "identity-hash")]
    identity_hash: bool,

    /// Log every resize, and with `-vv` every placement.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Uses the number itself as its hash, so consecutive keys land in
/// consecutive home slots.
#[derive(Default)]
struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = (self.0 << 8) | u64::from(byte);
        }
    }

    fn write_u64(&mut self, value: u64) {
        self.0 = value;
    }
}

fn count_frequencies<S>(mut frequencies: HashMap<u64, usize, S>, numbers: &[u64])
where
    S: std::hash::BuildHasher,
{
    for &n in numbers {
        match frequencies.get_mut(&n) {
            Some(count) => *count += 1,
            None => {
                if let Err(err) = frequencies.put(n, 1) {
                    eprintln!("Failed to store {n}: {err}");
                    return;
                }
            }
        }
    }

    let total_count: usize = frequencies.values().sum();
    assert_eq!(total_count, numbers.len());

    let mut pairs = frequencies.iter().map(|(&k, &v)| (k, v)).collect::<Vec<_>>();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (key, value) in &pairs {
        println!("Pair {{ key: {key}, value: {value} }}");
    }

    println!(
        "{} distinct numbers in {} slots ({:.2}% load factor)",
        frequencies.len(),
        frequencies.slot_count(),
        frequencies.load_factor() * 100.0
    );
    frequencies.probe_histogram().print();
    frequencies.debug_stats().print();

    let mut released = 0;
    frequencies.free_with(|_, _| released += 1);
    println!("Released {released} entries");
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let range = args.range.max(1);
    let numbers = (0..args.count)
        .map(|_| rng.random_range(0..range))
        .collect::<Vec<u64>>();

    println!(
        "Counting {} numbers drawn from 0..{} starting with {} slots",
        numbers.len(),
        range,
        args.slots
    );

    if args.identity_hash {
        let map = HashMap::with_slots_and_hasher(
            args.slots,
            BuildHasherDefault::<IdentityHasher>::default(),
        );
        count_frequencies(map, &numbers);
    } else {
        count_frequencies(HashMap::with_slots(args.slots), &numbers);
    }
}

use std::env;
use std::hint::black_box;
use std::process;

use simd_kernels::{
    RemapKernel, RemapParams, Stopwatch, simd_available, sum_parallel, sum_portable, sum_scalar,
    sum_simd,
};

const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;
const DEFAULT_DMIN: i32 = 60;
const DEFAULT_MMULT: i32 = 40;
const REMAP_TOLERANCE: f32 = 1.0e-4;

#[derive(Clone, Copy)]
enum Bench {
    SumScalar,
    SumSimd,
    SumPortable,
    SumParallel,
    Remap(RemapKernel),
}

const ALL_BENCHES: [Bench; 7] = [
    Bench::SumScalar,
    Bench::SumSimd,
    Bench::SumPortable,
    Bench::SumParallel,
    Bench::Remap(RemapKernel::Scalar),
    Bench::Remap(RemapKernel::Simd),
    Bench::Remap(RemapKernel::Portable),
];

#[derive(Clone, Copy)]
struct Config {
    bench: Bench,
    len: usize,
    cols: usize,
    iters: usize,
    seed: u64,
    threads: Option<usize>,
    verify: bool,
    report: bool,
}

type SumFn = fn(&[f32]) -> f64;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match parse_args() {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error: {err}");
            print_usage(&program_name());
            process::exit(2);
        }
    };

    if let Some(threads) = config.threads {
        if let Err(err) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            eprintln!("error: could not size the worker pool: {err}");
            process::exit(2);
        }
    }

    log::info!(
        "bench={} len={} iters={} threads={} simd={}",
        config.bench.name(),
        config.len,
        config.iters,
        rayon::current_num_threads(),
        simd_available()
    );

    if config.verify {
        if let Err(err) = verify_bench(&config) {
            log::error!("verification failed: {err}");
            process::exit(1);
        }
        log::info!("verification passed");
    }

    if let Err(err) = run_bench(config) {
        log::error!("{err}");
        process::exit(1);
    }
}

fn parse_args() -> Result<Config, String> {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "perf_harness".to_string());

    let mut bench = None;
    let mut len = None;
    let mut cols = None;
    let mut iters = None;
    let mut seed = DEFAULT_SEED;
    let mut threads = None;
    let mut verify = false;
    let mut report = true;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bench" => {
                let name = args.next().ok_or("--bench requires a value")?;
                let parsed = parse_bench(&name).ok_or_else(|| format!("unknown bench: {name}"))?;
                bench = Some(parsed);
            }
            "--len" => {
                let value = args.next().ok_or("--len requires a value")?;
                len = Some(parse_usize(&value, "--len")?);
            }
            "--cols" => {
                let value = args.next().ok_or("--cols requires a value")?;
                cols = Some(parse_usize(&value, "--cols")?);
            }
            "--iters" => {
                let value = args.next().ok_or("--iters requires a value")?;
                iters = Some(parse_usize(&value, "--iters")?);
            }
            "--seed" => {
                let value = args.next().ok_or("--seed requires a value")?;
                seed = parse_u64(&value, "--seed")?;
            }
            "--threads" => {
                let value = args.next().ok_or("--threads requires a value")?;
                let parsed = parse_usize(&value, "--threads")?;
                if parsed == 0 {
                    return Err("--threads must be at least 1".to_string());
                }
                threads = Some(parsed);
            }
            "--verify" => verify = true,
            "--report" => report = true,
            "--no-report" => report = false,
            "--list" => {
                list_benches();
                process::exit(0);
            }
            "-h" | "--help" => {
                print_usage(&program);
                process::exit(0);
            }
            _ => return Err(format!("unknown argument: {arg}")),
        }
    }

    let bench = bench.ok_or("missing --bench")?;
    let len = len.unwrap_or_else(|| bench.default_len());
    let iters = iters.unwrap_or_else(|| bench.default_iters());
    let cols = cols.unwrap_or(len.max(1));

    if cols == 0 || len % cols != 0 {
        return Err(format!("--cols {cols} must divide --len {len}"));
    }

    Ok(Config {
        bench,
        len,
        cols,
        iters,
        seed,
        threads,
        verify,
        report,
    })
}

fn program_name() -> String {
    env::args()
        .next()
        .unwrap_or_else(|| "perf_harness".to_string())
}

fn print_usage(program: &str) {
    eprintln!(
        "\
Usage:
  {program} --bench <name> [--len N] [--cols N] [--iters N] [--seed N] [--threads N] [--verify]
  {program} --list

Options:
  --bench <name>   Benchmark to run (see --list)
  --len N          Number of samples (default: 10_000_000 for sums, 20_000_000 for remaps)
  --cols N         Columns per row for remap shapes; must divide --len (default: --len)
  --iters N        Iterations (bench-specific default)
  --seed N         RNG seed (default: 0x123456789ABCDEF0)
  --threads N      Worker threads for the parallel kernels (default: all cores)
  --verify         Check the kernel against the scalar reference before timing
  --report         Print throughput summary after the run (default)
  --no-report      Disable throughput summary
  --list           Show available benches

Environment:
  SIMD_KERNELS_NO_AVX2=1   Force the non-AVX2 fallbacks on x86
  RUST_LOG=debug           Show dispatch and curve details
"
    );
}

fn list_benches() {
    for bench in ALL_BENCHES {
        println!("{}", bench.name());
    }
}

fn parse_bench(name: &str) -> Option<Bench> {
    ALL_BENCHES.into_iter().find(|bench| bench.name() == name)
}

impl Bench {
    fn default_len(self) -> usize {
        match self {
            Bench::SumScalar | Bench::SumSimd | Bench::SumPortable | Bench::SumParallel => {
                10_000_000
            }
            Bench::Remap(_) => 20_000_000,
        }
    }

    fn default_iters(self) -> usize {
        match self {
            Bench::SumScalar | Bench::SumSimd | Bench::SumPortable | Bench::SumParallel => 20,
            Bench::Remap(_) => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Bench::SumScalar => "sum_scalar",
            Bench::SumSimd => "sum_simd",
            Bench::SumPortable => "sum_portable",
            Bench::SumParallel => "sum_parallel",
            Bench::Remap(RemapKernel::Scalar) => "remap_scalar",
            Bench::Remap(RemapKernel::Simd) => "remap_simd",
            Bench::Remap(RemapKernel::Portable) => "remap_portable",
        }
    }

    fn sum_fn(self) -> Option<SumFn> {
        match self {
            Bench::SumScalar => Some(sum_scalar),
            Bench::SumSimd => Some(sum_simd),
            Bench::SumPortable => Some(sum_portable),
            Bench::SumParallel => Some(sum_parallel),
            Bench::Remap(_) => None,
        }
    }
}

fn parse_usize(value: &str, flag: &str) -> Result<usize, String> {
    value
        .replace('_', "")
        .parse::<usize>()
        .map_err(|_| format!("{flag} expects a non-negative integer"))
}

fn parse_u64(value: &str, flag: &str) -> Result<u64, String> {
    let digits = value.replace('_', "");
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    };
    parsed.map_err(|_| format!("{flag} expects a non-negative integer"))
}

#[inline]
fn next_u64(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    *state = x;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

/// Uniform samples in `[1, 2)`.
fn make_samples(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        let unit = (next_u64(&mut state) >> 40) as f32 / (1u64 << 24) as f32;
        values.push(1.0 + unit);
    }
    values
}

fn remap_params(config: &Config) -> RemapParams {
    RemapParams::new(
        DEFAULT_DMIN,
        DEFAULT_MMULT,
        config.len / config.cols,
        config.cols,
    )
}

fn run_bench(config: Config) -> Result<(), String> {
    let input = make_samples(config.len, config.seed);
    let mut watch = Stopwatch::started();
    match config.bench.sum_fn() {
        Some(func) => bench_sum(&config, &input, func),
        None => {
            if let Bench::Remap(kernel) = config.bench {
                bench_remap(&config, &input, kernel)?;
            }
        }
    }
    watch.stop();
    if config.report {
        print_report(&config, watch.elapsed());
    }
    Ok(())
}

fn bench_sum(config: &Config, input: &[f32], func: SumFn) {
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        acc += func(black_box(input));
    }
    black_box(acc);
}

fn bench_remap(config: &Config, input: &[f32], kernel: RemapKernel) -> Result<(), String> {
    let params = remap_params(config);
    let sample = config.len / 2;
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        let out = kernel
            .remap(black_box(input), params)
            .map_err(|err| err.to_string())?;
        acc += out.get(sample).copied().unwrap_or(0.0) as f64;
        black_box(&out);
    }
    black_box(acc);
    Ok(())
}

fn verify_bench(config: &Config) -> Result<(), String> {
    let len = config.len.clamp(1, 1 << 20);
    let input = make_samples(len, config.seed);

    match config.bench {
        Bench::Remap(kernel) => {
            let params = RemapParams::new(DEFAULT_DMIN, DEFAULT_MMULT, len, 1);
            let expected = RemapKernel::Scalar
                .remap(&input, params)
                .map_err(|err| err.to_string())?;
            let actual = kernel.remap(&input, params).map_err(|err| err.to_string())?;
            for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
                if (a - e).abs() > REMAP_TOLERANCE {
                    return Err(format!("sample {i}: {a} != {e}"));
                }
            }
        }
        bench => {
            let func = bench.sum_fn().ok_or("not a sum bench")?;
            let expected = sum_scalar(&input);
            let actual = func(&input);
            let tolerance = 1.0e-6 * (1.0 + expected.abs());
            if (actual - expected).abs() > tolerance {
                return Err(format!("sum {actual} != {expected}"));
            }
        }
    }
    Ok(())
}

fn print_report(config: &Config, elapsed_s: f64) {
    let work_items = (config.len as u128) * (config.iters as u128);
    // Sums read 4 bytes per sample; remaps read 4 and write 4.
    let bytes = match config.bench {
        Bench::Remap(_) => work_items * 8,
        _ => work_items * 4,
    };
    let items_per_s = work_items as f64 / elapsed_s;
    let bytes_per_s = bytes as f64 / elapsed_s;
    let ns_per_item = (elapsed_s * 1.0e9) / work_items.max(1) as f64;

    let lines = [
        format!(
            "bench={} len={} iters={}",
            config.bench.name(),
            config.len,
            config.iters
        ),
        format!(
            "elapsed_s={:.6} ns_per_item={:.3} throughput={}",
            elapsed_s,
            ns_per_item,
            format_rate(items_per_s, "elem")
        ),
        format!("bytes={} byte_throughput={}", bytes, format_rate(bytes_per_s, "B")),
    ];

    println!("{}", lines.join("\n"));
}

fn format_rate(rate: f64, unit: &str) -> String {
    let (value, prefix) = if rate >= 1.0e12 {
        (rate / 1.0e12, "T")
    } else if rate >= 1.0e9 {
        (rate / 1.0e9, "G")
    } else if rate >= 1.0e6 {
        (rate / 1.0e6, "M")
    } else if rate >= 1.0e3 {
        (rate / 1.0e3, "K")
    } else {
        (rate, "")
    };
    format!("{value:.3} {prefix}{unit}/s")
}

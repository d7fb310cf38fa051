//! Demo workloads: CPU-bound factoring on processes, simulated API calls on threads.
//! Also the task registry this binary serves when started as a process worker.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use parmap_core::{parallel_map, threaded_map, ExecutionConfig, RemoteTask, ResultSequence, TaskRegistry};
use rand::seq::SliceRandom;
use rand::Rng;

const PRIMES: [u64; 10] = [
    15485867, 15485917, 15485933, 15485941, 15485959, 15485977, 15485981, 15485987, 15485989,
    15486011,
];

/// Tasks this binary can run inside a worker process.
pub fn registry() -> TaskRegistry {
    TaskRegistry::new()
        .register("factor_semiprime", factor_semiprime)
        .register("divide_ten_by", divide_ten_by)
        .register("square", square)
        .register("sleep_ms", sleep_ms)
        .register("worker_pid", worker_pid)
        .register("exit_on_zero", exit_on_zero)
        .register("print_square", print_square)
}

/// Brute-force the two prime factors of `n`; `(n, 1)` if none is found.
pub fn factor_semiprime(n: &u64) -> Result<(u64, u64), String> {
    debug!("[pid {}] factoring {}", std::process::id(), n);
    let limit = (*n as f64).sqrt() as u64 + 1;
    for i in 2..=limit {
        if n % i == 0 {
            return Ok((i, n / i));
        }
    }
    Ok((*n, 1))
}

/// 10 / x; panics on zero like any integer division.
pub fn divide_ten_by(x: &i64) -> Result<i64, String> {
    Ok(10 / x)
}

pub fn square(x: &i64) -> Result<i64, String> {
    x.checked_mul(*x).ok_or_else(|| format!("{} squared overflows", x))
}

pub fn sleep_ms(ms: &u64) -> Result<u64, String> {
    thread::sleep(Duration::from_millis(*ms));
    Ok(*ms)
}

pub fn worker_pid(_: &u64) -> Result<u32, String> {
    Ok(std::process::id())
}

/// Kills the whole worker process on zero.
pub fn exit_on_zero(x: &i64) -> Result<i64, String> {
    if *x == 0 {
        std::process::exit(3);
    }
    Ok(*x)
}

/// Square `x`, announcing the work on stdout the way a chatty task would.
pub fn print_square(x: &i64) -> Result<i64, String> {
    println!("[pid {}] squaring {}", std::process::id(), x);
    square(x)
}

/// Pretend to call a remote API that takes `delay_ms` to answer.
pub fn simulated_api_call(delay_ms: &u64) -> Result<String, String> {
    let current = thread::current();
    debug!(
        "[{}] calling simulated API with {:.2}s delay",
        current.name().unwrap_or("main"),
        *delay_ms as f64 / 1000.0
    );
    thread::sleep(Duration::from_millis(*delay_ms));
    Ok(format!("Finished API call with {:.2}s delay", *delay_ms as f64 / 1000.0))
}

/// Wall time of a sequential run against a parallel run of the same inputs.
pub struct Comparison {
    pub sequential_ms: f64,
    pub parallel_ms: f64,
    pub failures: usize,
}

impl Comparison {
    pub fn speedup(&self) -> f64 {
        if self.parallel_ms > 0.0 {
            self.sequential_ms / self.parallel_ms
        } else {
            0.0
        }
    }
}

fn time_it<T>(label: &str, f: impl FnOnce() -> T) -> (f64, T) {
    let start = Instant::now();
    let result = f();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!("{} took {:.2} ms", label, elapsed_ms);
    (elapsed_ms, result)
}

/// Factor `count` random semiprimes sequentially, then on the process pool.
pub fn run_prime_computation(count: usize, config: &ExecutionConfig) -> Result<Comparison, String> {
    let mut rng = rand::thread_rng();
    let data: Vec<u64> = (0..count)
        .map(|_| {
            let p = PRIMES.choose(&mut rng).copied().unwrap_or(PRIMES[0]);
            let q = PRIMES.choose(&mut rng).copied().unwrap_or(PRIMES[0]);
            p * q
        })
        .collect();

    let (sequential_ms, _) = time_it("Sequential processing", || {
        data.iter().map(factor_semiprime).collect::<Vec<_>>()
    });
    let task = RemoteTask::<u64, (u64, u64)>::new("factor_semiprime");
    let (parallel_ms, results) = time_it("Multiprocessing (parallel_map)", || {
        parallel_map(&task, data.clone(), config)
    });
    let results = results.map_err(|e| e.to_string())?;
    check_factors(&data, &results, config)?;

    Ok(Comparison {
        sequential_ms,
        parallel_ms,
        failures: results.failures().len(),
    })
}

fn check_factors(
    data: &[u64],
    results: &ResultSequence<(u64, u64)>,
    config: &ExecutionConfig,
) -> Result<(), String> {
    if results.len() != data.len() {
        return Err(format!("expected {} results, got {}", data.len(), results.len()));
    }
    if config.completion_mode == parmap_core::CompletionMode::Ordered {
        for (n, slot) in data.iter().zip(results.iter()) {
            if let Some((p, q)) = slot {
                if p * q != *n {
                    return Err(format!("bad factors {} x {} for {}", p, q, n));
                }
            }
        }
    }
    Ok(())
}

/// Simulate `count` API calls sequentially, then on the thread pool.
pub fn run_network_simulation(count: usize, config: &ExecutionConfig) -> Result<Comparison, String> {
    let mut rng = rand::thread_rng();
    let data: Vec<u64> = (0..count).map(|_| rng.gen_range(100..=300)).collect();

    let (sequential_ms, _) = time_it("Sequential processing", || {
        data.iter().map(simulated_api_call).collect::<Vec<_>>()
    });
    let (parallel_ms, results) = time_it("Threaded processing (threaded_map)", || {
        threaded_map(simulated_api_call, data.clone(), config)
    });
    let results = results.map_err(|e| e.to_string())?;

    Ok(Comparison {
        sequential_ms,
        parallel_ms,
        failures: results.failures().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_semiprime() {
        assert_eq!(factor_semiprime(&(15485867 * 15485917)).unwrap(), (15485867, 15485917));
        assert_eq!(factor_semiprime(&15).unwrap(), (3, 5));
        assert_eq!(factor_semiprime(&13).unwrap(), (13, 1));
    }

    #[test]
    fn test_square_overflow() {
        assert_eq!(square(&-4).unwrap(), 16);
        assert!(square(&i64::MAX).is_err());
    }

    #[test]
    fn test_registry_has_demo_tasks() {
        let registry = registry();
        for name in [
            "factor_semiprime",
            "divide_ten_by",
            "square",
            "sleep_ms",
            "worker_pid",
            "exit_on_zero",
            "print_square",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_network_simulation_overlaps() {
        let config = ExecutionConfig::new().with_workers(6);
        let comparison = run_network_simulation(6, &config).unwrap();
        assert_eq!(comparison.failures, 0);
        assert!(comparison.speedup() > 1.5, "speedup {:.2}", comparison.speedup());
    }

    #[test]
    fn test_speedup_zero_guard() {
        let comparison = Comparison {
            sequential_ms: 10.0,
            parallel_ms: 0.0,
            failures: 0,
        };
        assert_eq!(comparison.speedup(), 0.0);
    }
}

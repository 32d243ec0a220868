use std::env;

/// Environment-driven configuration for the device and its tools.
#[derive(Debug, Clone)]
pub struct Config {
    /// Device node name (DEVNAME).
    pub dev_name: String,
    /// Minor number claimed in the registry (MINOR).
    pub minor: u32,
    /// Length of each mapping in pages (MAPPAGES).
    pub map_pages: u64,
    /// Worker thread count for fault_storm (THREADS).
    pub threads: u64,
    /// Total faults fault_storm delivers when RUNFOR is zero (FAULTS).
    pub faults: u64,
    /// fault_storm runtime in seconds; zero runs until FAULTS are done (RUNFOR).
    pub run_for: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev_name: "my_mmap".to_string(),
            minor: 99,
            map_pages: 1,
            threads: 4,
            faults: 100_000,
            run_for: 0,
        }
    }
}

impl Config {
    /// Build configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.dev_name = env::var("DEVNAME").unwrap_or(cfg.dev_name);
        cfg.minor = u32::try_from(env_or("MINOR", cfg.minor as u64)).unwrap_or(cfg.minor);
        cfg.map_pages = env_or("MAPPAGES", cfg.map_pages).max(1);
        cfg.threads = env_or("THREADS", cfg.threads).max(1);
        cfg.faults = env_or("FAULTS", cfg.faults);
        cfg.run_for = env_or("RUNFOR", cfg.run_for);
        cfg
    }
}

fn env_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| parse_num(&v))
        .unwrap_or(default)
}

pub(crate) fn parse_num(s: &str) -> Option<u64> {
    // Counts may be written as "1e6"; negative floats are rejected.
    s.parse::<u64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
}

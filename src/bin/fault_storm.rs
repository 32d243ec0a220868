use crossbeam_channel::{bounded, Receiver};
use lazy_mmap::config::Config;
use lazy_mmap::device::MmapDevice;
use lazy_mmap::memory::PAGE_SIZE;
use lazy_mmap::region::{MappingRegion, VmFlags, VmOperations};
use lazy_mmap::address_space::MMAP_BASE;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Faults every worker takes off the queue per batch.
const BATCH: usize = 256;

fn main() -> lazy_mmap::Result<()> {
    env_logger::init();
    let cfg = Config::from_env();
    let device = MmapDevice::from_config(&cfg);
    let handle = device.open(&cfg.dev_name)?;
    let len = cfg.map_pages as usize * PAGE_SIZE;

    // One region per worker, all over the same backing page.
    let regions: Vec<Arc<MappingRegion>> = (0..cfg.threads as usize)
        .map(|i| handle.mmap(MMAP_BASE + i * (len + PAGE_SIZE), len, VmFlags::READ))
        .collect::<lazy_mmap::Result<_>>()?;
    let baseline = handle.resource().and_then(|r| r.frame()).map_or(0, |f| f.use_count());

    println!(
        "fault storm: threads={}, faults={}, run_for={}s, map_pages={}",
        cfg.threads, cfg.faults, cfg.run_for, cfg.map_pages
    );

    let (tx, rx) = bounded::<Vec<usize>>(cfg.threads as usize * 2);
    let mut handles = Vec::new();
    for region in &regions {
        let region = region.clone();
        let rx = rx.clone();
        handles.push(thread::spawn(move || worker(region, rx)));
    }
    drop(rx);

    // Producer: a slice of the addresses lands one page past the region end.
    let start = Instant::now();
    let deadline = (cfg.run_for > 0).then(|| start + Duration::from_secs(cfg.run_for));
    let mut rng = StdRng::seed_from_u64(42);
    let offsets = Uniform::from(0..len + PAGE_SIZE);
    let mut sent = 0u64;
    loop {
        match deadline {
            Some(d) if Instant::now() >= d => break,
            None if sent >= cfg.faults => break,
            _ => {}
        }
        let batch: Vec<usize> = (0..BATCH).map(|_| offsets.sample(&mut rng)).collect();
        sent += batch.len() as u64;
        if tx.send(batch).is_err() {
            break;
        }
    }
    drop(tx);

    let mut resolved = 0u64;
    let mut bus_errors = 0u64;
    for h in handles {
        let (ok, err) = h.join().expect("worker panicked");
        resolved += ok;
        bus_errors += err;
    }
    let elapsed = start.elapsed().as_secs_f64();
    let after = handle.resource().and_then(|r| r.frame()).map_or(0, |f| f.use_count());

    println!(
        "resolved={}, bus_errors={}, throughput={:.2} faults/s, use_count before={} after={}",
        resolved,
        bus_errors,
        (resolved + bus_errors) as f64 / elapsed.max(f64::EPSILON),
        baseline,
        after,
    );
    for region in &regions {
        region.close()?;
    }
    handle.close()?;
    println!("stats: {:?}", device.stats_snapshot());
    Ok(())
}

/// Resolve each queued offset against `region`, dropping the page reference
/// right away as an unmap would.
fn worker(region: Arc<MappingRegion>, rx: Receiver<Vec<usize>>) -> (u64, u64) {
    let mut ok = 0u64;
    let mut err = 0u64;
    for batch in rx {
        for off in batch {
            match region.fault(region.start() + off) {
                Ok(page) => {
                    page.frame.put_page();
                    ok += 1;
                }
                Err(_) => err += 1,
            }
        }
    }
    (ok, err)
}

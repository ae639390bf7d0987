//! Periodic CPU / memory / disk sampler feeding the history log.
//!
//! Runs as a tokio task until its [`CancellationToken`] fires.  Sampling
//! reads `/proc` and calls `statvfs`, which is quick but blocking, so each
//! sample is taken on the blocking pool.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::entry::StatsSample;
use super::store::HistoryStore;

// ---------------------------------------------------------------------------
// ResourceProbe
// ---------------------------------------------------------------------------

/// Source of utilisation figures.  `None` means "could not sample this time".
pub trait ResourceProbe: Send + 'static {
    fn sample(&mut self) -> Option<StatsSample>;
}

/// Linux probe backed by `/proc/stat`, `/proc/meminfo` and `statvfs("/")`.
///
/// CPU usage is the busy share of jiffies between two consecutive calls, so
/// the first call after construction reports against boot time.
#[derive(Debug, Default)]
pub struct ProcProbe {
    last_cpu: Option<CpuTimes>,
}

impl ProcProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceProbe for ProcProbe {
    fn sample(&mut self) -> Option<StatsSample> {
        let cpu_now = std::fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|s| parse_cpu_times(&s));
        let cpu = match (self.last_cpu, cpu_now) {
            (Some(prev), Some(now)) => now.busy_percent_since(&prev),
            (None, Some(now)) => now.busy_percent_since(&CpuTimes::default()),
            _ => 0.0,
        };
        self.last_cpu = cpu_now.or(self.last_cpu);

        let mem = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|s| parse_mem_percent(&s))
            .unwrap_or(0.0);

        let disk = disk_percent("/").unwrap_or(0.0);

        if cpu_now.is_none() && mem == 0.0 && disk == 0.0 {
            return None;
        }
        Some(StatsSample::new(cpu, mem, disk))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

impl CpuTimes {
    fn busy_percent_since(&self, prev: &CpuTimes) -> f32 {
        let total = self.total.saturating_sub(prev.total);
        if total == 0 {
            return 0.0;
        }
        let busy = self.busy.saturating_sub(prev.busy);
        (busy as f64 / total as f64 * 100.0) as f32
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

/// Used-memory percentage from `/proc/meminfo` (`MemTotal` vs `MemAvailable`).
fn parse_mem_percent(meminfo: &str) -> Option<f32> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find_map(|l| l.strip_prefix(name))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse().ok())
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some((total.saturating_sub(available) as f64 / total as f64 * 100.0) as f32)
}

#[cfg(unix)]
fn disk_percent(path: &str) -> Option<f32> {
    use std::ffi::CString;

    let c_path = CString::new(path).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return None;
    }

    let blocks: u64 = stat.f_blocks as _;
    let bfree: u64 = stat.f_bfree as _;
    let frsize: u64 = stat.f_frsize as _;
    let total = blocks.wrapping_mul(frsize);
    if total == 0 {
        return None;
    }
    let used = blocks.saturating_sub(bfree).wrapping_mul(frsize);
    Some((used as f64 / total as f64 * 100.0) as f32)
}

#[cfg(not(unix))]
fn disk_percent(_path: &str) -> Option<f32> {
    None
}

// ---------------------------------------------------------------------------
// StatsSampler
// ---------------------------------------------------------------------------

/// Background task appending one [`StatsSample`] per interval.
pub struct StatsSampler;

impl StatsSampler {
    /// Spawn the sampler on the current tokio runtime.
    ///
    /// The first sample is taken after one full interval.
    pub fn spawn<P: ResourceProbe>(
        store: Arc<HistoryStore>,
        probe: P,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let probe = Arc::new(Mutex::new(probe));

        tokio::spawn(async move {
            log::info!("stats: sampler started ({}s interval)", interval.as_secs());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let probe = Arc::clone(&probe);
                let sample = tokio::task::spawn_blocking(move || match probe.lock() {
                    Ok(mut p) => p.sample(),
                    Err(poisoned) => poisoned.into_inner().sample(),
                })
                .await;

                match sample {
                    Ok(Some(sample)) => store.append(sample),
                    Ok(None) => log::debug!("stats: probe returned no sample"),
                    Err(e) => log::warn!("stats: sampling task failed: {e}"),
                }
            }
            log::info!("stats: sampler stopped");
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! CPU profiler: samples process CPU time into a file until released.
//!
//! Output format, one sample per line:
//! ```text
//! # cpu profile pid=<pid> interval_ms=10
//! <elapsed_us> <user_ticks> <system_ticks>
//! # stopped samples=<n>
//! ```
//! Tick columns are `-` where `/proc/self/stat` is unavailable.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::lifecycle::guard::{Resource, ScopedResource};

const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

type SamplerResult = io::Result<(BufWriter<File>, u64)>;

/// A running profiler. Wrap in `ScopedResource` via `acquire`.
pub struct CpuProfiler {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    sampler: Option<JoinHandle<SamplerResult>>,
}

impl CpuProfiler {
    /// Start profiling into `path`, or do nothing when no path is configured.
    pub fn acquire(path: Option<&Path>) -> io::Result<Option<ScopedResource<Self>>> {
        match path.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Ok(Some(ScopedResource::new(Self::start(path)?))),
            None => Ok(None),
        }
    }

    /// Create the output file and begin sampling.
    pub fn start(path: &Path) -> io::Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(
            writer,
            "# cpu profile pid={} interval_ms={}",
            std::process::id(),
            SAMPLE_INTERVAL.as_millis()
        )?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let sampler = std::thread::Builder::new()
            .name("cpu-profiler".into())
            .spawn(move || sample_loop(writer, flag))?;

        tracing::info!(profile = %path.display(), "Starting CPU profiler");
        Ok(Self {
            path: path.to_path_buf(),
            stop,
            sampler: Some(sampler),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn sample_loop(mut writer: BufWriter<File>, stop: Arc<AtomicBool>) -> SamplerResult {
    let started = Instant::now();
    let mut samples = 0u64;
    while !stop.load(Ordering::Acquire) {
        std::thread::park_timeout(SAMPLE_INTERVAL);
        let elapsed = started.elapsed().as_micros();
        match read_cpu_ticks() {
            Some((user, system)) => writeln!(writer, "{elapsed} {user} {system}")?,
            None => writeln!(writer, "{elapsed} - -")?,
        }
        samples += 1;
    }
    Ok((writer, samples))
}

/// User and system ticks from `/proc/self/stat` (fields 14 and 15).
fn read_cpu_ticks() -> Option<(u64, u64)> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // The command name may contain spaces; fields are counted after its closing paren.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let user = fields.next()?.parse().ok()?;
    let system = fields.next()?.parse().ok()?;
    Some((user, system))
}

impl Resource for CpuProfiler {
    type Error = io::Error;

    fn name(&self) -> &str {
        "cpu-profiler"
    }

    fn release(&mut self) -> io::Result<()> {
        let Some(sampler) = self.sampler.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::Release);
        sampler.thread().unpark();

        let (mut writer, samples) = sampler
            .join()
            .map_err(|_| io::Error::other("cpu profiler thread panicked"))??;
        writeln!(writer, "# stopped samples={samples}")?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        tracing::info!(profile = %self.path.display(), samples, "Stopped CPU profiler");
        Ok(())
    }
}

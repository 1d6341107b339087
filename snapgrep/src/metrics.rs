use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks scan progress and buffer usage across workers
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // File processing metrics
    files_searched: Arc<AtomicU64>,
    files_skipped: Arc<AtomicU64>,
    files_pruned: Arc<AtomicU64>,
    read_failures: Arc<AtomicU64>,

    // Buffer metrics
    bytes_read: Arc<AtomicU64>,
    buffer_peak: Arc<AtomicU64>,

    // Compiled regex cache metrics
    cache_hits: Arc<AtomicU64>,
    cache_misses: Arc<AtomicU64>,
}

impl ScanMetrics {
    /// Creates a new ScanMetrics instance
    pub fn new() -> Self {
        Self {
            files_searched: Arc::new(AtomicU64::new(0)),
            files_skipped: Arc::new(AtomicU64::new(0)),
            files_pruned: Arc::new(AtomicU64::new(0)),
            read_failures: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            buffer_peak: Arc::new(AtomicU64::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a file whose content was read and matched
    pub fn record_file_searched(&self, bytes: u64) {
        self.files_searched.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a file rejected by the path filter
    pub fn record_file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a file rejected by the literal or whole-file pre-filter
    pub fn record_file_pruned(&self) {
        self.files_pruned.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a file that could not be read
    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the size of a worker's scratch buffer after growing it
    pub fn record_buffer_size(&self, bytes: u64) {
        let mut peak = self.buffer_peak.load(Ordering::Relaxed);
        while bytes > peak {
            match self.buffer_peak.compare_exchange_weak(
                peak,
                bytes,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    debug!("Scratch buffer grew to {} bytes", bytes);
                    break;
                }
                Err(current) => peak = current,
            }
        }
    }

    /// Records compiled regex cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Gets current scan statistics
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            files_searched: self.files_searched.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_pruned: self.files_pruned.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            buffer_peak: self.buffer_peak.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Logs current scan statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Files searched/skipped/pruned: {}/{}/{}\n\
             Read failures: {}\n\
             Bytes read: {}\n\
             Peak scratch buffer: {} bytes\n\
             Regex cache hits/misses: {}/{}",
            stats.files_searched,
            stats.files_skipped,
            stats.files_pruned,
            stats.read_failures,
            stats.bytes_read,
            stats.buffer_peak,
            stats.cache_hits,
            stats.cache_misses
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of scan statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub files_searched: u64,
    pub files_skipped: u64,
    pub files_pruned: u64,
    pub read_failures: u64,
    pub bytes_read: u64,
    pub buffer_peak: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

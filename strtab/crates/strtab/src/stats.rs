//! Table statistics
//!
//! Gathered by walking every bucket of the active table, so the numbers are
//! a snapshot that may already be stale when printed.

use serde::Serialize;
use std::fmt::Write;

/// Aggregate shape of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStatistics {
    pub bucket_count: usize,
    /// Slots, live or not yet reaped
    pub entry_count: usize,
    pub live_count: usize,
    /// Approximate bytes retained by live strings
    pub literal_bytes: usize,
    /// Bytes per bucket header
    pub bucket_bytes: usize,
    /// Bytes per slot
    pub entry_bytes: usize,
    pub max_bucket_len: usize,
    pub average_bucket_len: f64,
    pub bucket_len_variance: f64,
}

impl TableStatistics {
    pub fn std_dev(&self) -> f64 {
        self.bucket_len_variance.sqrt()
    }

    /// Table structure plus the strings it refers to
    pub fn approximate_payload_bytes(&self) -> usize {
        self.bucket_count * self.bucket_bytes
            + self.entry_count * self.entry_bytes
            + self.literal_bytes
    }

    /// Append the tabular text form
    pub fn print_to(&self, out: &mut String, name: &str) {
        let literal_avg = if self.live_count == 0 {
            0.0
        } else {
            self.literal_bytes as f64 / self.live_count as f64
        };

        let _ = writeln!(out, "{} statistics:", name);
        let _ = writeln!(
            out,
            "Number of buckets       : {:>9} = {:>9} bytes, each {}",
            self.bucket_count,
            self.bucket_count * self.bucket_bytes,
            self.bucket_bytes
        );
        let _ = writeln!(
            out,
            "Number of entries       : {:>9} = {:>9} bytes, each {}",
            self.entry_count,
            self.entry_count * self.entry_bytes,
            self.entry_bytes
        );
        let _ = writeln!(
            out,
            "Number of literals      : {:>9} = {:>9} bytes, avg {:7.3}",
            self.live_count, self.literal_bytes, literal_avg
        );
        let _ = writeln!(
            out,
            "Total footprint         : {:>9} = {:>9} bytes",
            "",
            self.approximate_payload_bytes()
        );
        let _ = writeln!(out, "Average bucket size     : {:9.3}", self.average_bucket_len);
        let _ = writeln!(out, "Variance of bucket size : {:9.3}", self.bucket_len_variance);
        let _ = writeln!(out, "Std. dev. of bucket size: {:9.3}", self.std_dev());
        let _ = writeln!(out, "Maximum bucket size     : {:9}", self.max_bucket_len);
    }
}

/// Accumulates per-bucket observations
#[derive(Debug, Default)]
pub(crate) struct StatisticsBuilder {
    buckets: usize,
    entries: usize,
    live: usize,
    literal_bytes: usize,
    max_len: usize,
    sum_sq: f64,
}

impl StatisticsBuilder {
    pub(crate) fn record_bucket(&mut self, len: usize) {
        self.buckets += 1;
        self.entries += len;
        self.max_len = self.max_len.max(len);
        self.sum_sq += (len * len) as f64;
    }

    pub(crate) fn record_live(&mut self, literal_bytes: usize) {
        self.live += 1;
        self.literal_bytes += literal_bytes;
    }

    pub(crate) fn finish(self, bucket_bytes: usize, entry_bytes: usize) -> TableStatistics {
        let (average, variance) = if self.buckets == 0 {
            (0.0, 0.0)
        } else {
            let n = self.buckets as f64;
            let mean = self.entries as f64 / n;
            (mean, (self.sum_sq / n - mean * mean).max(0.0))
        };

        TableStatistics {
            bucket_count: self.buckets,
            entry_count: self.entries,
            live_count: self.live,
            literal_bytes: self.literal_bytes,
            bucket_bytes,
            entry_bytes,
            max_bucket_len: self.max_len,
            average_bucket_len: average,
            bucket_len_variance: variance,
        }
    }
}

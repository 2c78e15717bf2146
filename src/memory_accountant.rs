//! Memory accountant: approximate per-record footprint, a running
//! total, and pressure callbacks.
use crate::record::Record;
use std::sync::atomic::{AtomicU64, Ordering};

/// A registered pressure callback, invoked once per threshold crossing.
pub type PressureCallback = Box<dyn Fn(PressureLevel, f64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Warning,
    Critical,
}

/// Estimate a record's footprint in bytes.
///
/// The dimension-band multipliers (×70 / ×80 / ×2) are a calibration
/// knob tuned to observed
/// allocator behavior under the reference test corpus, not a derivation
/// from first principles. Callers should test *monotonicity* (a longer
/// vector costs at least as much) rather than depend on exact byte
/// counts.
pub fn estimate_record_bytes(record: &Record) -> usize {
    let dim = record.vector.len();
    let vector_payload = dim * 8;
    let multiplier: usize = if dim >= 1000 {
        70
    } else if dim >= 500 {
        80
    } else {
        2
    };
    let vector_cost = vector_payload * multiplier;

    let metadata_cost = estimate_metadata_bytes(record);

    vector_cost + metadata_cost
}

fn estimate_metadata_bytes(record: &Record) -> usize {
    // Conservative upper bound: twice the UTF-16 byte length of the
    // canonical JSON string form of the metadata.
    let canonical = serde_json::to_string(&record.metadata).unwrap_or_default();
    canonical.encode_utf16().count() * 2 * 2
}

/// Tracks a running total of estimated memory usage and fires
/// registered pressure callbacks when thresholds are crossed.
pub struct MemoryAccountant {
    total_bytes: AtomicU64,
    cap_bytes: f64,
    warning_threshold: f64,
    critical_threshold: f64,
    warning_fired: std::sync::atomic::AtomicBool,
    critical_fired: std::sync::atomic::AtomicBool,
    callbacks: std::sync::Mutex<Vec<PressureCallback>>,
}

impl MemoryAccountant {
    pub fn new(max_memory_mb: f64, warning_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            cap_bytes: max_memory_mb * 1_048_576.0,
            warning_threshold,
            critical_threshold,
            warning_fired: std::sync::atomic::AtomicBool::new(false),
            critical_fired: std::sync::atomic::AtomicBool::new(false),
            callbacks: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn register_callback(&self, cb: PressureCallback) {
        self.callbacks.lock().unwrap().push(cb);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn cap_bytes(&self) -> f64 {
        self.cap_bytes
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.cap_bytes <= 0.0 {
            0.0
        } else {
            self.total_bytes() as f64 / self.cap_bytes
        }
    }

    /// Projected usage ratio if `additional_bytes` were added on top of
    /// the current total, without mutating state.
    pub fn projected_ratio(&self, additional_bytes: u64) -> f64 {
        if self.cap_bytes <= 0.0 {
            0.0
        } else {
            (self.total_bytes() + additional_bytes) as f64 / self.cap_bytes
        }
    }

    /// Recompute the running total from scratch over the current record
    /// set, an O(n) rescan used after bulk mutations.
    pub fn refresh<'a>(&self, records: impl Iterator<Item = &'a Record>) {
        let total: u64 = records.map(|r| estimate_record_bytes(r) as u64).sum();
        self.total_bytes.store(total, Ordering::Relaxed);
        self.check_thresholds();
    }

    fn check_thresholds(&self) {
        let ratio = self.usage_ratio();
        let callbacks = self.callbacks.lock().unwrap();

        if ratio >= self.critical_threshold {
            if !self.critical_fired.swap(true, Ordering::Relaxed) {
                for cb in callbacks.iter() {
                    cb(PressureLevel::Critical, ratio);
                }
            }
        } else {
            self.critical_fired.store(false, Ordering::Relaxed);
        }

        if ratio >= self.warning_threshold {
            if !self.warning_fired.swap(true, Ordering::Relaxed) {
                for cb in callbacks.iter() {
                    cb(PressureLevel::Warning, ratio);
                }
            }
        } else {
            self.warning_fired.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Metadata;

    fn rec(dim: usize) -> Record {
        Record::new("vec_0_abcdefghi".into(), vec![0.5; dim], Metadata::new())
    }

    #[test]
    fn larger_vectors_cost_at_least_as_much() {
        let small = estimate_record_bytes(&rec(10));
        let medium = estimate_record_bytes(&rec(600));
        let large = estimate_record_bytes(&rec(1200));
        assert!(medium >= small);
        assert!(large >= medium);
    }

    #[test]
    fn warning_callback_fires_once_per_crossing() {
        let accountant = MemoryAccountant::new(1.0, 0.5, 0.9);
        let count = std::sync::Arc::new(AtomicU64::new(0));
        let count_clone = count.clone();
        accountant.register_callback(Box::new(move |level, _ratio| {
            if level == PressureLevel::Warning {
                count_clone.fetch_add(1, Ordering::Relaxed);
            }
        }));

        let records = vec![rec(50_000)]; // pushes well past the 1MB*0.5 warning line
        accountant.refresh(records.iter());
        accountant.refresh(records.iter());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn usage_ratio_reflects_cap() {
        let accountant = MemoryAccountant::new(1.0, 0.5, 0.9);
        accountant.refresh(std::iter::empty());
        assert_eq!(accountant.usage_ratio(), 0.0);
    }
}

//! Per-shot segmentation and spectrum accumulation.
//!
//! Slices the corrected hit stream into per-shot windows at the recovered
//! trigger instants, re-references each window to its own earliest hit, keeps
//! only shot-relative times inside the valid range, and accumulates one count
//! per occurrence into the running time-of-flight spectrum.

use std::collections::BTreeMap;

/// Histogram of hit counts versus shot-relative time.
///
/// Keys are non-negative relative times in integer nanoseconds; the map
/// accumulates across shots and across buffers for the duration of one
/// acquisition run. Snapshots handed to consumers are sorted ascending by
/// construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Spectrum {
    bins: BTreeMap<u64, u64>,
}

impl Spectrum {
    /// An empty spectrum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all accumulated counts (acquisition start).
    pub fn reset(&mut self) {
        self.bins.clear();
    }

    /// Adds one count at the given relative time.
    pub fn record(&mut self, time_ns: u64) {
        *self.bins.entry(time_ns).or_insert(0) += 1;
    }

    /// Number of distinct time bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True when nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Sum of all counts.
    pub fn total_counts(&self) -> u64 {
        self.bins.values().sum()
    }

    /// Snapshot as ascending `(time_ns, count)` pairs.
    pub fn to_pairs(&self) -> Vec<(u64, u64)> {
        self.bins.iter().map(|(&t, &c)| (t, c)).collect()
    }
}

/// Segments a buffer into per-shot windows and accumulates the spectrum.
///
/// `toa_ns` are the buffer's corrected arrival times in any order; they are
/// sorted internally. `triggers` are the recovered shot instants, ascending.
/// Window `i` spans from the insertion point of trigger `i-1` to the
/// insertion point of trigger `i`, with an explicit end-of-buffer sentinel
/// for the final window. The pre-trigger window (everything before the first
/// trigger) cannot be shot-referenced and is discarded. Each remaining
/// window is re-referenced to its own minimum and only relative times in
/// `[min_time_ns, max_time_ns)` contribute. Empty windows, before or after
/// range filtering, are skipped without error.
pub fn accumulate_shots(
    toa_ns: &[f64],
    triggers: &[f64],
    min_time_ns: f64,
    max_time_ns: f64,
    spectrum: &mut Spectrum,
) {
    if toa_ns.is_empty() || triggers.is_empty() {
        return;
    }

    let mut times = toa_ns.to_vec();
    times.sort_by(f64::total_cmp);

    let mut start = 0usize;
    for i in 0..=triggers.len() {
        // End-of-buffer sentinel for the window after the last trigger.
        let end = match triggers.get(i) {
            Some(&t) => times.partition_point(|&v| v <= t),
            None => times.len(),
        };
        if i == 0 {
            // Hits before the first recognized trigger are discarded.
            start = end;
            continue;
        }

        let window = &times[start..end];
        start = end;
        let Some(&shot_zero) = window.first() else {
            continue;
        };
        for &t in window {
            let rel = t - shot_zero;
            if rel >= min_time_ns && rel < max_time_ns {
                spectrum.record(rel.round() as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_trigger_window_is_discarded() {
        let toa: Vec<f64> = vec![10_000.0, 50_000.0, 110_000.0, 130_000.0, 210_000.0, 215_000.0];
        let triggers = vec![100_000.0, 200_000.0];
        let mut spectrum = Spectrum::new();
        accumulate_shots(&toa, &triggers, 0.0, 50_000.0, &mut spectrum);

        // Window 1: {110000, 130000} -> rel {0, 20000}
        // Window 2: {210000, 215000} -> rel {0, 5000}
        assert_eq!(
            spectrum.to_pairs(),
            vec![(0, 2), (5_000, 1), (20_000, 1)]
        );
        assert_eq!(spectrum.total_counts(), 4);
    }

    #[test]
    fn out_of_range_relative_times_are_dropped() {
        let toa = vec![100_000.0, 100_500.0, 160_000.0];
        let triggers = vec![90_000.0];
        let mut spectrum = Spectrum::new();
        accumulate_shots(&toa, &triggers, 0.0, 50_000.0, &mut spectrum);

        // rel times: 0, 500, 60000 -> the last exceeds the range.
        assert_eq!(spectrum.to_pairs(), vec![(0, 1), (500, 1)]);
    }

    #[test]
    fn total_equals_in_range_hits_across_windows() {
        let toa: Vec<f64> = (0..30).map(|i| f64::from(i) * 10_000.0).collect();
        let triggers = vec![100_000.0, 200_000.0];
        let mut spectrum = Spectrum::new();
        accumulate_shots(&toa, &triggers, 0.0, 50_000.0, &mut spectrum);

        // Insertion points are after equal elements, so the 100k hit closes
        // the discarded pre-trigger window. Window 1 holds 110k..=200k
        // (rel 0..=90k, 5 in range), window 2 holds 210k..=290k
        // (rel 0..=80k, 5 in range).
        assert_eq!(spectrum.total_counts(), 10);
    }

    #[test]
    fn empty_windows_are_skipped() {
        let toa = vec![300_000.0, 301_000.0];
        let triggers = vec![100_000.0, 200_000.0, 299_000.0];
        let mut spectrum = Spectrum::new();
        accumulate_shots(&toa, &triggers, 0.0, 50_000.0, &mut spectrum);

        // Windows after triggers 1 and 2 hold no hits; only the final window
        // contributes.
        assert_eq!(spectrum.to_pairs(), vec![(0, 1), (1_000, 1)]);
    }

    #[test]
    fn no_triggers_contributes_nothing() {
        let toa = vec![1.0, 2.0, 3.0];
        let mut spectrum = Spectrum::new();
        accumulate_shots(&toa, &[], 0.0, 50_000.0, &mut spectrum);
        assert!(spectrum.is_empty());
    }

    #[test]
    fn unsorted_input_is_sorted_internally() {
        let toa = vec![130_000.0, 110_000.0];
        let triggers = vec![100_000.0];
        let mut spectrum = Spectrum::new();
        accumulate_shots(&toa, &triggers, 0.0, 50_000.0, &mut spectrum);
        assert_eq!(spectrum.to_pairs(), vec![(0, 1), (20_000, 1)]);
    }

    #[test]
    fn accumulation_across_calls_is_deterministic() {
        let toa_a = vec![110_000.0, 115_000.0];
        let toa_b = vec![110_000.0, 120_000.0];
        let triggers = vec![100_000.0];

        let mut first = Spectrum::new();
        accumulate_shots(&toa_a, &triggers, 0.0, 50_000.0, &mut first);
        accumulate_shots(&toa_b, &triggers, 0.0, 50_000.0, &mut first);

        let mut second = Spectrum::new();
        accumulate_shots(&toa_a, &triggers, 0.0, 50_000.0, &mut second);
        accumulate_shots(&toa_b, &triggers, 0.0, 50_000.0, &mut second);

        assert_eq!(first.to_pairs(), second.to_pairs());
        assert_eq!(first.total_counts(), 4);
    }
}

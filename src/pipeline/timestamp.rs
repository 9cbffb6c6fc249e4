//! Timestamp wraparound correction.
//!
//! The detector's arrival-time counter is 31 bits wide with a 25/2 ns tick,
//! so raw ToA values overflow every ~53.7 s. A buffer recorded across the
//! overflow point contains a group of large times from before the wrap and a
//! group of small times from after it. The correction detects that split,
//! lifts the post-wrap group by one overflow period, and then re-references
//! the whole buffer to its earliest hit.

/// Counter overflow period in nanoseconds (2^31 - 1 ticks at 12.5 ns).
pub const OVERFLOW_PERIOD_NS: f64 = 2_147_483_647.0 * 25.0 / 2.0;

/// Raw times above this are treated as pre-wrap when a split is detected.
const WRAP_HIGH_NS: f64 = 20e9;

/// Raw times below this are treated as post-wrap when a split is detected.
const WRAP_LOW_NS: f64 = 10e9;

/// Repairs counter wraparound in place and zero-references the buffer.
///
/// A buffer whose maximum raw time exceeds [`WRAP_HIGH_NS`] while its minimum
/// is below [`WRAP_LOW_NS`] is treated as an overflow split: every time below
/// [`WRAP_LOW_NS`] is lifted by [`OVERFLOW_PERIOD_NS`]. Afterwards the
/// (possibly updated) minimum is subtracted from all times so the earliest
/// hit sits at 0. Output order follows input order; monotonicity is not
/// guaranteed and downstream stages must not assume it.
pub fn correct_timestamps(toa_ns: &mut [f64]) {
    let Some((min, max)) = min_max(toa_ns) else {
        return;
    };

    if max > WRAP_HIGH_NS && min < WRAP_LOW_NS {
        for t in toa_ns.iter_mut() {
            if *t < WRAP_LOW_NS {
                *t += OVERFLOW_PERIOD_NS;
            }
        }
    }

    // Minimum may have moved if the old minimum was lifted.
    if let Some((min, _)) = min_max(toa_ns) {
        for t in toa_ns.iter_mut() {
            *t -= min;
        }
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(values.iter().fold((first, first), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    }))
}

//! Trigger recovery by density-based temporal clustering.
//!
//! The reference LED flashes once per shot, so the arrival times of bright
//! hits near the fiducial form one dense group per shot with no external
//! trigger line required. A 1-D DBSCAN over the distinct arrival times
//! recovers those groups; each cluster's minimum time is that shot's trigger
//! instant. Points with no dense neighborhood are noise and excluded.

use crate::config::PipelineSettings;
use crate::event::EventBuffer;
use crate::pipeline::image::Centroid;

/// Per-point DBSCAN outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointLabel {
    /// Member of the cluster with the given id.
    Clustered(usize),
    /// No dense neighborhood; excluded from trigger recovery.
    Noise,
}

/// DBSCAN over sorted 1-D points.
///
/// A point is a core point when at least `min_samples` points (itself
/// included) lie within `eps` of it. Clusters grow from core points; border
/// points adopt the cluster of the core point that reached them. Cluster ids
/// are assigned in order of discovery along the sorted axis.
pub fn dbscan_1d(sorted: &[f64], eps: f64, min_samples: usize) -> Vec<PointLabel> {
    let n = sorted.len();
    let mut labels: Vec<Option<PointLabel>> = vec![None; n];
    let mut next_cluster = 0usize;

    let neighborhood = |i: usize| -> (usize, usize) {
        let lo = sorted.partition_point(|&v| v < sorted[i] - eps);
        let hi = sorted.partition_point(|&v| v <= sorted[i] + eps);
        (lo, hi)
    };

    for i in 0..n {
        if labels[i].is_some() {
            continue;
        }
        let (lo, hi) = neighborhood(i);
        if hi - lo < min_samples {
            labels[i] = Some(PointLabel::Noise);
            continue;
        }

        // New cluster seeded at i; expand through core points.
        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = Some(PointLabel::Clustered(cluster));
        let mut frontier: Vec<usize> = (lo..hi).filter(|&j| j != i).collect();
        while let Some(j) = frontier.pop() {
            if labels[j] == Some(PointLabel::Noise) {
                // Border point: reachable but not itself core.
                labels[j] = Some(PointLabel::Clustered(cluster));
            }
            if labels[j].is_some() {
                continue;
            }
            labels[j] = Some(PointLabel::Clustered(cluster));
            let (jlo, jhi) = neighborhood(j);
            if jhi - jlo >= min_samples {
                frontier.extend((jlo..jhi).filter(|&k| labels[k].is_none()));
            }
        }
    }

    labels
        .into_iter()
        .map(|l| l.unwrap_or(PointLabel::Noise))
        .collect()
}

/// Recovers the per-shot trigger instants from a corrected buffer.
///
/// Hits within `roi_half_width` pixels of the fiducial centroid in both axes
/// and with ToT at or above the threshold are selected; their distinct
/// arrival times are clustered with [`dbscan_1d`]; the minimum time of each
/// cluster is taken as a trigger instant. The result is sorted ascending and
/// deduplicated. An empty selection or an all-noise clustering yields an
/// empty set, which downstream segmentation treats as "no shots this buffer".
pub fn recover_triggers(
    buffer: &EventBuffer,
    centroid: Centroid,
    settings: &PipelineSettings,
) -> Vec<f64> {
    let col_lo = centroid.col.saturating_sub(settings.roi_half_width);
    let col_hi = centroid.col.saturating_add(settings.roi_half_width);
    let row_lo = centroid.row.saturating_sub(settings.roi_half_width);
    let row_hi = centroid.row.saturating_add(settings.roi_half_width);

    let mut times: Vec<f64> = buffer
        .hits()
        .filter(|hit| {
            hit.tot >= settings.tot_threshold
                && (col_lo..=col_hi).contains(&hit.x())
                && (row_lo..=row_hi).contains(&hit.y())
        })
        .map(|hit| hit.toa_ns)
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup();
    if times.is_empty() {
        return Vec::new();
    }

    let labels = dbscan_1d(&times, settings.cluster_eps_ns, settings.cluster_min_samples);

    // First occurrence per cluster id is that cluster's minimum, since the
    // points are sorted.
    let mut seen: Vec<bool> = Vec::new();
    let mut triggers = Vec::new();
    for (t, label) in times.iter().zip(&labels) {
        if let PointLabel::Clustered(id) = *label {
            if seen.len() <= id {
                seen.resize(id + 1, false);
            }
            if !seen[id] {
                seen[id] = true;
                triggers.push(*t);
            }
        }
    }
    triggers.sort_by(f64::total_cmp);
    triggers.dedup();
    triggers
}

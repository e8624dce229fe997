use munkres::{solve_assignment, WeightMatrix};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Detection, Track};

// Cost of a pair that is not allowed to match, must stay finite for the solver
const GATED_COST: f32 = 100_000.0;

/// Strategy used to pair current detections with previous tracks
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Matching {
    /// Detections in input order each claim the nearest unclaimed track,
    /// ties go to the lowest track id
    Greedy,
    /// Minimum total centroid distance over all gated pairs
    Optimal,
}

impl Default for Matching {
    fn default() -> Self {
        Matching::Greedy
    }
}

#[derive(Debug)]
pub struct Assignment {
    /// Tracks alive after this frame, in detection order
    pub tracks: Vec<Track>,
    /// Next id that will be handed to an unmatched detection
    pub next_id: u32,
    /// Ids of previous tracks nothing claimed this frame
    pub evicted: Vec<u32>,
}

/// Stitches `detections` onto `previous`. Every previous track is claimed at
/// most once; detections farther than `max_distance` from any unclaimed track
/// open a new id. The result replaces the previous set wholesale.
pub fn assign(
    detections: &[Detection],
    previous: Vec<Track>,
    next_id: u32,
    max_distance: f32,
    matching: Matching,
) -> Assignment {
    let mut next_id = previous
        .iter()
        .map(|t| t.id + 1)
        .max()
        .map_or(next_id, |n| n.max(next_id));

    let pairs = match matching {
        Matching::Greedy => greedy_pairs(detections, &previous, max_distance),
        Matching::Optimal => optimal_pairs(detections, &previous, max_distance)
            .unwrap_or_else(|| greedy_pairs(detections, &previous, max_distance)),
    };

    let mut slots: Vec<Option<Track>> = previous.into_iter().map(Some).collect();
    let mut tracks = Vec::with_capacity(detections.len());
    let mut fresh = 0;

    for (det, pair) in detections.iter().zip(pairs) {
        match pair.and_then(|idx| slots[idx].take()) {
            Some(track) => tracks.push(track.advance(*det)),
            None => {
                tracks.push(Track::new(next_id, *det));
                next_id += 1;
                fresh += 1;
            }
        }
    }

    let evicted: Vec<u32> = slots.into_iter().flatten().map(|t| t.id).collect();

    debug!(
        "assigned {} detections: {} matched, {} new, {} evicted",
        detections.len(),
        detections.len() - fresh,
        fresh,
        evicted.len()
    );

    Assignment {
        tracks,
        next_id,
        evicted,
    }
}

/// For each detection, the index of the previous track it claims
fn greedy_pairs(detections: &[Detection], previous: &[Track], max_distance: f32) -> Vec<Option<usize>> {
    let mut order: Vec<usize> = (0..previous.len()).collect();
    order.sort_by_key(|&idx| previous[idx].id);

    let mut claimed = vec![false; previous.len()];

    detections
        .iter()
        .map(|det| {
            let mut best: Option<(usize, f32)> = None;

            for &idx in &order {
                if claimed[idx] {
                    continue;
                }

                let dist = det.centroid_distance(&previous[idx].detection);
                if dist < max_distance && best.map_or(true, |(_, d)| dist < d) {
                    best = Some((idx, dist));
                }
            }

            let (idx, _) = best?;
            claimed[idx] = true;

            Some(idx)
        })
        .collect()
}

fn optimal_pairs(
    detections: &[Detection],
    previous: &[Track],
    max_distance: f32,
) -> Option<Vec<Option<usize>>> {
    let mut pairs = vec![None; detections.len()];

    if previous.is_empty() || detections.is_empty() {
        return Some(pairs);
    }

    let n = detections.len().max(previous.len());
    let cost = |r: usize, c: usize| -> f32 {
        if r < previous.len() && c < detections.len() {
            let dist = detections[c].centroid_distance(&previous[r].detection);
            if dist < max_distance {
                return dist;
            }
        }

        GATED_COST
    };

    let mut mat = WeightMatrix::from_fn(n, |(r, c)| cost(r, c));

    match solve_assignment(&mut mat) {
        Ok(solution) => {
            for pos in solution {
                if pos.row < previous.len()
                    && pos.column < detections.len()
                    && cost(pos.row, pos.column) < max_distance
                {
                    pairs[pos.column] = Some(pos.row);
                }
            }

            Some(pairs)
        }
        Err(err) => {
            warn!("assignment could not be solved ({:?}), falling back to greedy", err);
            None
        }
    }
}

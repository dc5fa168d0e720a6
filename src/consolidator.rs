//! Region Consolidator — density-based clustering of rectangles into
//! persistent, temporally-tracked consolidated regions.
//!
//! This is the largest and most stateful component in the pipeline: it
//! holds the only state that survives the clustering math itself (the
//! previous frame and background model live in `pipeline::Pipeline`
//! instead).

use std::collections::{BTreeSet, VecDeque};

use opencv::{core::Scalar, imgproc};

use crate::config::ConsolidationConfig;
use crate::types::{ConsolidatedRegion, Diagnostics, Rectangle, TrackedRect};

/// A cluster's bounds and membership before it is either merged into an
/// existing region or inserted as a brand-new one.
struct NewRegion {
    bounds: Rectangle,
    member_ids: BTreeSet<u64>,
}

pub struct RegionConsolidator {
    cfg: ConsolidationConfig,
    regions: Vec<ConsolidatedRegion>,
    next_region_id: u64,
}

impl RegionConsolidator {
    pub fn new(cfg: ConsolidationConfig) -> Self {
        Self { cfg, regions: Vec::new(), next_region_id: 0 }
    }

    pub fn reset(&mut self) {
        self.regions.clear();
        self.next_region_id = 0;
    }

    pub fn regions(&self) -> &[ConsolidatedRegion] {
        &self.regions
    }

    /// Run one consolidation pass: cluster this frame's rectangles, age and
    /// rematch existing regions against them, merge or insert the fresh
    /// clusters, then evict anything that has gone stale too long.
    pub fn consolidate(
        &mut self,
        rectangles: &[TrackedRect],
        diagnostics: &mut Diagnostics,
    ) -> Vec<ConsolidatedRegion> {
        let valid: Vec<&TrackedRect> = rectangles
            .iter()
            .filter(|t| t.rect.width > 0 && t.rect.height > 0)
            .collect();
        let malformed = rectangles.len() - valid.len();
        diagnostics.degenerate_contours += malformed as u64;

        if valid.is_empty() {
            self.age_all();
            self.evict(diagnostics);
            return self.regions.clone();
        }

        let clusters = cluster(&valid, &self.cfg);
        let new_regions: Vec<NewRegion> = clusters
            .into_iter()
            .map(|indices| {
                let mut bounds = valid[indices[0]].rect;
                let mut member_ids = BTreeSet::new();
                member_ids.insert(valid[indices[0]].id);
                for &i in &indices[1..] {
                    bounds = bounds.union(&valid[i].rect);
                    member_ids.insert(valid[i].id);
                }
                let bounds = bounds.expand_and_clamp(
                    self.cfg.expansion_factor,
                    self.cfg.frame_width as i32,
                    self.cfg.frame_height as i32,
                );
                NewRegion { bounds, member_ids }
            })
            .collect();

        self.age_all();
        self.rematch_existing(&valid);
        self.merge_new_regions(new_regions);
        self.evict(diagnostics);

        self.regions.clone()
    }

    fn age_all(&mut self) {
        for r in &mut self.regions {
            r.frames_since_update += 1;
        }
    }

    /// Re-scan this frame's rectangles for ids that match an existing
    /// region's member set. Lower-id regions claim contested ids first, so
    /// ambiguous ownership resolves deterministically.
    fn rematch_existing(&mut self, valid: &[&TrackedRect]) {
        let current_ids: BTreeSet<u64> = valid.iter().map(|t| t.id).collect();
        let mut claimed: BTreeSet<u64> = BTreeSet::new();

        let mut order: Vec<usize> = (0..self.regions.len()).collect();
        order.sort_by_key(|&i| self.regions[i].id);

        for i in order {
            let matched: BTreeSet<u64> = self.regions[i]
                .member_ids
                .iter()
                .copied()
                .filter(|id| current_ids.contains(id) && !claimed.contains(id))
                .collect();

            if matched.is_empty() {
                continue;
            }

            for id in &matched {
                claimed.insert(*id);
            }

            let mut bounds: Option<Rectangle> = None;
            for t in valid.iter().filter(|t| matched.contains(&t.id)) {
                bounds = Some(match bounds {
                    Some(b) => b.union(&t.rect),
                    None => t.rect,
                });
            }
            if let Some(b) = bounds {
                self.regions[i].bounds = b.expand_and_clamp(
                    self.cfg.expansion_factor,
                    self.cfg.frame_width as i32,
                    self.cfg.frame_height as i32,
                );
                self.regions[i].member_ids = matched;
                self.regions[i].frames_since_update = 0;
            }
        }
    }

    /// Merge each newly-clustered region into the lowest-id existing region
    /// it overlaps above `merge_overlap_ratio`, or insert it as a brand-new
    /// consolidated region.
    fn merge_new_regions(&mut self, new_regions: Vec<NewRegion>) {
        for new_region in new_regions {
            let target = self
                .regions
                .iter()
                .enumerate()
                .filter(|(_, r)| overlap_ratio(&r.bounds, &new_region.bounds) > self.cfg.merge_overlap_ratio)
                .min_by_key(|(_, r)| r.id)
                .map(|(idx, _)| idx);

            match target {
                Some(idx) => {
                    let existing = &mut self.regions[idx];
                    existing.bounds = existing.bounds.union(&new_region.bounds).expand_and_clamp(
                        1.0,
                        self.cfg.frame_width as i32,
                        self.cfg.frame_height as i32,
                    );
                    existing.member_ids.extend(new_region.member_ids);
                    existing.frames_since_update = 0;
                }
                None => {
                    let id = self.next_region_id;
                    self.next_region_id += 1;
                    self.regions.push(ConsolidatedRegion {
                        id,
                        bounds: new_region.bounds,
                        member_ids: new_region.member_ids,
                        frames_since_update: 0,
                    });
                }
            }
        }
    }

    fn evict(&mut self, diagnostics: &mut Diagnostics) {
        let before = self.regions.len();
        self.regions.retain(|r| r.frames_since_update <= self.cfg.max_frames_without_update);
        diagnostics.stale_evictions += (before - self.regions.len()) as u64;
    }

    /// Side-output variant: identical clustering/tracking core, plus a
    /// visualization image. Never called from the hot `process_frame` path.
    pub fn consolidate_visualize(
        &mut self,
        rectangles: &[TrackedRect],
        frame: &opencv::core::Mat,
        diagnostics: &mut Diagnostics,
    ) -> anyhow::Result<(Vec<ConsolidatedRegion>, opencv::core::Mat)> {
        let regions = self.consolidate(rectangles, diagnostics);
        let mut canvas = frame.clone();
        for region in &regions {
            let rect = opencv::core::Rect::new(
                region.bounds.x,
                region.bounds.y,
                region.bounds.width,
                region.bounds.height,
            );
            imgproc::rectangle(&mut canvas, rect, Scalar::new(0.0, 255.0, 0.0, 0.0), 2, imgproc::LINE_8, 0)?;
        }
        Ok((regions, canvas))
    }
}

/// Overlap-aware distance in `[0, 1]`: `overlapWeight * (1 - IoU) +
/// edgeWeight * normalized_edge_gap`.
fn combined_distance(a: &Rectangle, b: &Rectangle, cfg: &ConsolidationConfig) -> f64 {
    let iou = a.iou(b);
    let overlap_component = 1.0 - iou;
    let edge_component = if iou > 0.0 {
        0.0
    } else {
        (a.edge_gap(b) / cfg.max_edge_distance).clamp(0.0, 1.0)
    };
    cfg.overlap_weight * overlap_component + cfg.edge_weight * edge_component
}

fn overlap_ratio(a: &Rectangle, b: &Rectangle) -> f64 {
    match a.intersection(b) {
        Some(inter) => {
            let smaller = a.area().min(b.area());
            if smaller <= 0 {
                0.0
            } else {
                inter.area() as f64 / smaller as f64
            }
        }
        None => 0.0,
    }
}

/// Classic DBSCAN over the tracked rectangles using `combined_distance` in
/// place of Euclidean distance. Returns groups of indices into `points`.
///
/// A point with no other point within `eps` at all (its only neighbor is
/// itself) seeds a singleton cluster rather than being dropped as noise —
/// otherwise a single isolated detection could never become a region, no
/// matter how many frames it persists across. `min_points` only filters
/// points that have *some* neighbors but not enough to be considered dense.
fn cluster(points: &[&TrackedRect], cfg: &ConsolidationConfig) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut visited = vec![false; n];
    let mut label: Vec<Option<usize>> = vec![None; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    let neighbors_of = |i: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| combined_distance(&points[i].rect, &points[j].rect, cfg) <= cfg.eps)
            .collect()
    };

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let neighbors = neighbors_of(i);
        if neighbors.len() == 1 {
            let cluster_id = clusters.len();
            clusters.push(vec![i]);
            label[i] = Some(cluster_id);
            continue;
        }
        if neighbors.len() < cfg.min_points {
            continue;
        }

        let cluster_id = clusters.len();
        clusters.push(Vec::new());
        label[i] = Some(cluster_id);
        clusters[cluster_id].push(i);

        let mut queue: VecDeque<usize> = neighbors.into_iter().collect();
        while let Some(j) = queue.pop_front() {
            if !visited[j] {
                visited[j] = true;
                let j_neighbors = neighbors_of(j);
                if j_neighbors.len() >= cfg.min_points {
                    for nb in j_neighbors {
                        queue.push_back(nb);
                    }
                }
            }
            if label[j].is_none() {
                label[j] = Some(cluster_id);
                clusters[cluster_id].push(j);
            }
        }
    }

    clusters
}

//! Cross-market segmentation: standardize → PCA → k-means.
//!
//! Records from both markets are pooled; the market tag rides along for
//! display only and never enters the distance computation.
//!
//! # Algorithm
//!
//! 1. **Feature matrix**: keep records whose configured features are all
//!    present. Fewer than `k` such records is `InsufficientData`.
//! 2. **Standardize**: z-score every feature over the pooled set. Features
//!    with zero variance are dropped with a warning.
//! 3. **Project**: principal components from a Jacobi eigen-decomposition of
//!    the covariance matrix; the first two give the display coordinates.
//! 4. **Cluster**: k-means++ seeding from a fixed seed, Lloyd iterations
//!    until no centre moves more than `tolerance` or the iteration cap.
//! 5. **Label**: ids are renumbered by ascending centre position so the
//!    same partition always gets the same ids.

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{ClusterSpace, SegmentationConfig};
use crate::data::model::{Market, Metric, VehicleRecord};
use crate::error::QueryError;

/// Supported cluster counts.
pub const K_RANGE: std::ops::RangeInclusive<usize> = 3..=5;

const VARIANCE_EPS: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Metric(Metric),
    /// Horsepower per litre; the efficiency proxy both markets share.
    SpecificOutput,
}

impl Feature {
    pub fn value(self, record: &VehicleRecord) -> Option<f64> {
        match self {
            Feature::Metric(m) => m.value(record),
            Feature::SpecificOutput => record.specific_output(),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Metric(m) => write!(f, "{m}"),
            Feature::SpecificOutput => write!(f, "hp_per_litre"),
        }
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    /// Position of the record in the slice passed to [`segment`].
    pub record_index: usize,
    pub market: Market,
    pub year: i32,
    pub manufacturer: String,
    pub cluster_id: usize,
    /// First two principal-component scores.
    pub coords: [f64; 2],
}

/// Mean projected position of one cluster's members in one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CenterPoint {
    pub year: i32,
    pub cluster_id: usize,
    pub count: usize,
    pub coords: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segmentation {
    pub k: usize,
    /// Features that entered the model, in column order.
    pub features: Vec<Feature>,
    /// Configured features dropped for zero variance.
    pub excluded_features: Vec<Feature>,
    /// Share of total variance captured by PC1 and PC2.
    pub explained_variance: [f64; 2],
    /// Cluster centres in the clustering space, indexed by cluster id.
    pub centers: Vec<Vec<f64>>,
    pub assignments: Vec<ClusterAssignment>,
    pub iterations: usize,
    pub converged: bool,
    /// Sum of squared distances to assigned centres.
    pub inertia: f64,
}

impl Segmentation {
    /// Per year and cluster, the mean projected coordinates of its members.
    pub fn center_trajectories(&self) -> Vec<CenterPoint> {
        let mut sums: BTreeMap<(i32, usize), (usize, [f64; 2])> = BTreeMap::new();
        for a in &self.assignments {
            let (n, acc) = sums.entry((a.year, a.cluster_id)).or_insert((0, [0.0; 2]));
            *n += 1;
            acc[0] += a.coords[0];
            acc[1] += a.coords[1];
        }
        sums.into_iter()
            .map(|((year, cluster_id), (count, acc))| CenterPoint {
                year,
                cluster_id,
                count,
                coords: [acc[0] / count as f64, acc[1] / count as f64],
            })
            .collect()
    }

    /// Members per market in each cluster.
    pub fn market_mix(&self) -> BTreeMap<usize, BTreeMap<Market, usize>> {
        let mut mix: BTreeMap<usize, BTreeMap<Market, usize>> = BTreeMap::new();
        for a in &self.assignments {
            *mix.entry(a.cluster_id).or_default().entry(a.market).or_insert(0) += 1;
        }
        mix
    }

    /// Distance between the Sports and EPA centroids in projected space,
    /// per year. `None` for years where either market has no members.
    /// A shrinking gap signals the two markets converging.
    pub fn market_gap_by_year(&self) -> Vec<(i32, Option<f64>)> {
        let mut sums: BTreeMap<i32, BTreeMap<Market, (usize, [f64; 2])>> = BTreeMap::new();
        for a in &self.assignments {
            let (n, acc) = sums
                .entry(a.year)
                .or_default()
                .entry(a.market)
                .or_insert((0, [0.0; 2]));
            *n += 1;
            acc[0] += a.coords[0];
            acc[1] += a.coords[1];
        }
        sums.into_iter()
            .map(|(year, by_market)| {
                let centroid = |m: Market| {
                    by_market
                        .get(&m)
                        .map(|(n, acc)| [acc[0] / *n as f64, acc[1] / *n as f64])
                };
                let gap = match (centroid(Market::Sports), centroid(Market::Epa)) {
                    (Some(s), Some(e)) => Some(euclidean_sq(&s, &e).sqrt()),
                    _ => None,
                };
                (year, gap)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Cluster the records that carry every configured feature.
///
/// Deterministic: the same records, config and seed always give the same
/// assignments.
pub fn segment(
    records: &[&VehicleRecord],
    config: &SegmentationConfig,
) -> Result<Segmentation, QueryError> {
    let k = config.k;
    if !K_RANGE.contains(&k) {
        return Err(QueryError::InvalidClusterCount(k));
    }

    // Phase 1: complete rows only
    let mut members: Vec<usize> = Vec::new();
    let mut raw: Vec<Vec<f64>> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let row: Option<Vec<f64>> = config.features.iter().map(|f| f.value(rec)).collect();
        if let Some(row) = row {
            members.push(i);
            raw.push(row);
        }
    }
    if raw.len() < k {
        return Err(QueryError::InsufficientData { needed: k, available: raw.len() });
    }

    // Phase 2: standardize, dropping flat features
    let (z, kept) = standardize(&raw);
    let excluded_features: Vec<Feature> = config
        .features
        .iter()
        .enumerate()
        .filter(|(j, _)| !kept.contains(j))
        .map(|(_, f)| *f)
        .collect();
    for f in &excluded_features {
        log::warn!("feature {f} has zero variance across {} records; excluded", raw.len());
    }
    if kept.is_empty() {
        return Err(QueryError::ZeroVariance);
    }
    let features: Vec<Feature> = kept.iter().map(|&j| config.features[j]).collect();

    // Phase 3: principal components
    let pca = Pca::fit(&z);
    let projected: Vec<[f64; 2]> = z.iter().map(|row| pca.project(row)).collect();

    // Phase 4: k-means in the configured space
    let space: Vec<Vec<f64>> = match config.space {
        ClusterSpace::Projected => projected.iter().map(|p| p.to_vec()).collect(),
        ClusterSpace::Standardized => z,
    };
    let fit = kmeans(&space, k, config.seed, config.max_iterations, config.tolerance);
    log::debug!(
        "k-means k={k} on {} records: {} iterations, converged={}, inertia={:.4}",
        space.len(),
        fit.iterations,
        fit.converged,
        fit.inertia
    );

    // Phase 5: stable labels
    let order = canonical_order(&fit.centers);
    let mut relabel = vec![0usize; k];
    for (new_id, &old_id) in order.iter().enumerate() {
        relabel[old_id] = new_id;
    }
    let centers: Vec<Vec<f64>> = order.iter().map(|&old| fit.centers[old].clone()).collect();

    let assignments = members
        .iter()
        .zip(&fit.labels)
        .zip(&projected)
        .map(|((&idx, &label), coords)| {
            let rec = records[idx];
            ClusterAssignment {
                record_index: idx,
                market: rec.market,
                year: rec.year,
                manufacturer: rec.manufacturer.clone(),
                cluster_id: relabel[label],
                coords: *coords,
            }
        })
        .collect();

    Ok(Segmentation {
        k,
        features,
        excluded_features,
        explained_variance: pca.explained,
        centers,
        assignments,
        iterations: fit.iterations,
        converged: fit.converged,
        inertia: fit.inertia,
    })
}

// ---------------------------------------------------------------------------
// Standardization
// ---------------------------------------------------------------------------

/// Z-score each column. Returns the standardized rows restricted to the
/// columns with non-zero variance, and the indices of those columns.
fn standardize(rows: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<usize>) {
    let n = rows.len() as f64;
    let d = rows.first().map_or(0, Vec::len);

    let mut stats = Vec::with_capacity(d);
    for j in 0..d {
        let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
        let var = rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n;
        stats.push((mean, var.sqrt()));
    }
    let kept: Vec<usize> = (0..d).filter(|&j| stats[j].1 > VARIANCE_EPS).collect();

    let z = rows
        .iter()
        .map(|r| {
            kept.iter()
                .map(|&j| (r[j] - stats[j].0) / stats[j].1)
                .collect()
        })
        .collect();
    (z, kept)
}

// ---------------------------------------------------------------------------
// PCA
// ---------------------------------------------------------------------------

struct Pca {
    /// Up to two unit-length principal axes.
    axes: Vec<Vec<f64>>,
    explained: [f64; 2],
}

impl Pca {
    fn fit(z: &[Vec<f64>]) -> Self {
        let n = z.len() as f64;
        let d = z.first().map_or(0, Vec::len);

        let mut cov = vec![vec![0.0; d]; d];
        for row in z {
            for a in 0..d {
                for b in a..d {
                    cov[a][b] += row[a] * row[b];
                }
            }
        }
        for a in 0..d {
            for b in a..d {
                cov[a][b] /= n;
                cov[b][a] = cov[a][b];
            }
        }

        let (values, vectors) = jacobi_eigen(cov);
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

        let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
        let mut explained = [0.0; 2];
        let mut axes = Vec::with_capacity(2);
        for (slot, &c) in order.iter().take(2).enumerate() {
            let mut axis: Vec<f64> = (0..d).map(|r| vectors[r][c]).collect();
            // Sign convention: the largest-magnitude loading is positive.
            let pivot = axis
                .iter()
                .copied()
                .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
            if pivot < 0.0 {
                axis.iter_mut().for_each(|x| *x = -*x);
            }
            if total > 0.0 {
                explained[slot] = values[c].max(0.0) / total;
            }
            axes.push(axis);
        }
        Pca { axes, explained }
    }

    fn project(&self, row: &[f64]) -> [f64; 2] {
        let mut out = [0.0; 2];
        for (slot, axis) in self.axes.iter().enumerate() {
            out[slot] = axis.iter().zip(row).map(|(a, x)| a * x).sum();
        }
        out
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
/// Returns eigenvalues and a matrix whose columns are the eigenvectors.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let d = a.len();
    let mut v: Vec<Vec<f64>> = (0..d)
        .map(|i| (0..d).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for _sweep in 0..100 {
        let off: f64 = (0..d)
            .flat_map(|p| ((p + 1)..d).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off < 1e-22 {
            break;
        }
        for p in 0..d {
            for q in (p + 1)..d {
                if a[p][q].abs() < 1e-300 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..d {
                    let (akp, akq) = (a[k][p], a[k][q]);
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..d {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let values = (0..d).map(|i| a[i][i]).collect();
    (values, v)
}

// ---------------------------------------------------------------------------
// k-means
// ---------------------------------------------------------------------------

struct KMeansFit {
    centers: Vec<Vec<f64>>,
    labels: Vec<usize>,
    iterations: usize,
    converged: bool,
    inertia: f64,
}

fn euclidean_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the nearest centre and its squared distance; ties go to the lower id.
fn nearest(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, center) in centers.iter().enumerate() {
        let d = euclidean_sq(point, center);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++ seeding.
fn seed_centers(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut chosen = vec![rng.gen_range(0..n)];

    while chosen.len() < k {
        let centers: Vec<Vec<f64>> = chosen.iter().map(|&i| points[i].clone()).collect();
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centers).1).collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = n - 1;
            for (i, w) in weights.iter().enumerate() {
                acc += w;
                if acc >= target && *w > 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            // Every point sits on a centre already; take the next unused index.
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        };
        chosen.push(next);
    }

    chosen.iter().map(|&i| points[i].clone()).collect()
}

fn kmeans(points: &[Vec<f64>], k: usize, seed: u64, max_iterations: usize, tolerance: f64) -> KMeansFit {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centers = seed_centers(points, k, &mut rng);
    let dim = points[0].len();

    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;

        for (label, p) in labels.iter_mut().zip(points) {
            *label = nearest(p, &centers).0;
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (s, x) in sums[label].iter_mut().zip(p) {
                *s += x;
            }
        }

        let mut new_centers: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .map(|(sum, &n)| sum.into_iter().map(|s| s / n.max(1) as f64).collect())
            .collect();

        // Re-seed empty clusters with the point farthest from its centre.
        for c in 0..k {
            if counts[c] > 0 {
                continue;
            }
            let far = points
                .iter()
                .enumerate()
                .map(|(i, p)| (i, euclidean_sq(p, &centers[labels[i]])))
                .fold((0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best })
                .0;
            new_centers[c] = points[far].clone();
            labels[far] = c;
        }

        let shift = centers
            .iter()
            .zip(&new_centers)
            .map(|(a, b)| euclidean_sq(a, b).sqrt())
            .fold(0.0, f64::max);
        centers = new_centers;

        if shift < tolerance {
            converged = true;
            break;
        }
    }

    let mut inertia = 0.0;
    for (label, p) in labels.iter_mut().zip(points) {
        let (c, d) = nearest(p, &centers);
        *label = c;
        inertia += d;
    }

    KMeansFit { centers, labels, iterations, converged, inertia }
}

/// Old cluster ids sorted by centre position (first coordinate, then the rest).
fn canonical_order(centers: &[Vec<f64>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..centers.len()).collect();
    order.sort_by(|&a, &b| {
        centers[a]
            .iter()
            .zip(&centers[b])
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(a.cmp(&b))
    });
    order
}

//! K-D tree over float descriptors.
//!
//! Space-partitioning tree using axis-aligned hyperplanes.
//!
//! Algorithm:
//! - Split on the axis with the largest spread, at the median (`select_nth`)
//! - Stop at `leaf_size` rows, or when all rows in a node coincide
//! - Search descends to the near child first and only visits the far child
//!   if the squared distance to the splitting plane can still beat the
//!   current k-th best
//!
//! With `max_checks = None` the search is exact. Setting it bounds the number
//! of stored rows compared per query (FLANN-style "checks"), which trades
//! recall for speed once `k` hits have been found.
//!
//! # References
//!
//! - Friedman, Bentley, Finkel (1977): "An algorithm for finding best matches
//!   in logarithmic expected time"
//! - Muja, Lowe (2009): "Fast approximate nearest neighbors with automatic
//!   algorithm configuration"

use super::{Neighbor, Neighbors, SpatialIndex, TopK};
use crate::descriptor::{DescriptorData, Descriptors};
use crate::error::{IndexError, Result};
use crate::simd;
use serde::{Deserialize, Serialize};

/// K-D tree parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdTreeParams {
    /// Maximum rows per leaf.
    pub leaf_size: usize,

    /// Maximum stored rows compared per query row; `None` searches exactly.
    pub max_checks: Option<usize>,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self {
            leaf_size: 16,
            max_checks: None,
        }
    }
}

/// K-D tree node.
#[derive(Debug)]
enum KdNode {
    /// Rows with `row[axis] <= value` on the left, `>= value` on the right.
    Split {
        axis: usize,
        value: f32,
        left: Box<KdNode>,
        right: Box<KdNode>,
    },
    Leaf {
        positions: Vec<u32>,
    },
}

/// K-D tree index.
#[derive(Debug)]
pub struct KdTreeIndex {
    params: KdTreeParams,
    vectors: Vec<f32>,
    dimension: usize,
    num_vectors: usize,
    root: Option<KdNode>,
}

struct SearchState {
    top: TopK,
    checks: usize,
    max_checks: Option<usize>,
}

impl SearchState {
    fn exhausted(&self) -> bool {
        match self.max_checks {
            Some(max) => self.checks >= max && self.top.is_full(),
            None => false,
        }
    }
}

impl KdTreeIndex {
    pub fn new(params: KdTreeParams) -> Self {
        Self {
            params,
            vectors: Vec::new(),
            dimension: 0,
            num_vectors: 0,
            root: None,
        }
    }

    pub fn params(&self) -> &KdTreeParams {
        &self.params
    }

    /// Depth of the tree (a single leaf has depth 1).
    pub fn depth(&self) -> usize {
        fn depth_of(node: &KdNode) -> usize {
            match node {
                KdNode::Leaf { .. } => 1,
                KdNode::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        self.root.as_ref().map_or(0, depth_of)
    }

    fn get_vector(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    fn build_tree(&self, positions: &mut [u32]) -> KdNode {
        let leaf_size = self.params.leaf_size.max(1);
        if positions.len() <= leaf_size {
            return KdNode::Leaf {
                positions: positions.to_vec(),
            };
        }

        let (axis, spread) = self.widest_axis(positions);
        if spread <= 0.0 {
            // Every row in this node is identical.
            return KdNode::Leaf {
                positions: positions.to_vec(),
            };
        }

        let mid = positions.len() / 2;
        positions.select_nth_unstable_by(mid, |&a, &b| {
            self.get_vector(a as usize)[axis].total_cmp(&self.get_vector(b as usize)[axis])
        });
        let value = self.get_vector(positions[mid] as usize)[axis];

        let (left, right) = positions.split_at_mut(mid);
        KdNode::Split {
            axis,
            value,
            left: Box::new(self.build_tree(left)),
            right: Box::new(self.build_tree(right)),
        }
    }

    /// Axis with the largest max-min spread among `positions`.
    fn widest_axis(&self, positions: &[u32]) -> (usize, f32) {
        let mut best = (0usize, 0.0f32);
        for axis in 0..self.dimension {
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for &p in positions {
                let v = self.get_vector(p as usize)[axis];
                lo = lo.min(v);
                hi = hi.max(v);
            }
            let spread = hi - lo;
            if spread > best.1 {
                best = (axis, spread);
            }
        }
        best
    }

    fn search_recursive(&self, node: &KdNode, query: &[f32], state: &mut SearchState) {
        if state.exhausted() {
            return;
        }
        match node {
            KdNode::Leaf { positions } => {
                for &p in positions {
                    let distance = simd::l2_distance_squared(query, self.get_vector(p as usize));
                    state.top.push(Neighbor {
                        position: p,
                        distance,
                    });
                    state.checks += 1;
                }
            }
            KdNode::Split {
                axis,
                value,
                left,
                right,
            } => {
                let diff = query[*axis] - value;
                let (near, far) = if diff < 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };

                self.search_recursive(near, query, state);

                // Strict comparison keeps equal-distance rows reachable so the
                // lower position wins ties.
                let plane = diff * diff;
                match state.top.worst() {
                    Some(worst) if plane > worst => {}
                    _ => self.search_recursive(far, query, state),
                }
            }
        }
    }
}

impl SpatialIndex for KdTreeIndex {
    fn build(&mut self, data: Descriptors) -> Result<()> {
        self.clear();
        let (shape, rows) = (data.shape(), data.rows());
        let DescriptorData::F32(values) = data.into_data() else {
            return Err(IndexError::InvariantViolation(format!(
                "kd-tree requires float rows, got {shape}"
            )));
        };

        self.vectors = values;
        self.dimension = shape.dim;
        self.num_vectors = rows;
        if self.num_vectors > 0 {
            let mut positions: Vec<u32> = (0..self.num_vectors as u32).collect();
            let root = self.build_tree(&mut positions);
            self.root = Some(root);
        }
        Ok(())
    }

    fn knn_search(&self, query: &Descriptors, k: usize) -> Result<Vec<Neighbors>> {
        let Some(root) = self.root.as_ref() else {
            return Ok(vec![Neighbors::new(); query.rows()]);
        };
        if query.rows() == 0 {
            return Ok(Vec::new());
        }
        let values = match query.data() {
            DescriptorData::F32(values) if query.dim() == self.dimension => values,
            _ => {
                return Err(IndexError::InvariantViolation(format!(
                    "kd-tree over f32x{} queried with {}",
                    self.dimension,
                    query.shape()
                )))
            }
        };

        let results = values
            .chunks_exact(self.dimension)
            .map(|q| {
                let mut state = SearchState {
                    top: TopK::new(k),
                    checks: 0,
                    max_checks: self.params.max_checks,
                };
                self.search_recursive(root, q, &mut state);
                state.top.into_neighbors()
            })
            .collect();
        Ok(results)
    }

    fn len(&self) -> usize {
        self.num_vectors
    }

    fn clear(&mut self) {
        self.vectors.clear();
        self.dimension = 0;
        self.num_vectors = 0;
        self.root = None;
    }

    fn name(&self) -> &'static str {
        "kd-tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LinearScan;

    fn grid(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                let x = (i % 10) as f32;
                let y = (i / 10) as f32;
                vec![x, y, (x * y).sin()]
            })
            .collect()
    }

    #[test]
    fn self_match_on_every_row() {
        let rows = grid(100);
        let data = Descriptors::from_f32_rows(&rows).unwrap();
        let mut tree = KdTreeIndex::new(KdTreeParams {
            leaf_size: 4,
            max_checks: None,
        });
        tree.build(data.clone()).unwrap();
        assert!(tree.depth() > 1);

        let hits = tree.knn_search(&data, 1).unwrap();
        for (i, h) in hits.iter().enumerate() {
            assert_eq!(h[0].position, i as u32);
            assert_eq!(h[0].distance, 0.0);
        }
    }

    #[test]
    fn matches_linear_scan() {
        let rows = grid(97);
        let data = Descriptors::from_f32_rows(&rows).unwrap();
        let mut tree = KdTreeIndex::new(KdTreeParams {
            leaf_size: 3,
            max_checks: None,
        });
        tree.build(data.clone()).unwrap();
        let scan = LinearScan::over(data);

        let queries = Descriptors::from_f32_rows(&[
            vec![0.4, 0.6, 0.1],
            vec![8.7, 3.2, -0.5],
            vec![100.0, -4.0, 0.0],
        ])
        .unwrap();
        let a = tree.knn_search(&queries, 2).unwrap();
        let b = scan.knn_search(&queries, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_rows_collapse_into_leaf_and_tie_on_lowest_position() {
        let rows = vec![vec![1.0, 1.0]; 40];
        let data = Descriptors::from_f32_rows(&rows).unwrap();
        let mut tree = KdTreeIndex::new(KdTreeParams {
            leaf_size: 2,
            max_checks: None,
        });
        tree.build(data).unwrap();
        assert_eq!(tree.depth(), 1);

        let q = Descriptors::from_f32_rows(&[vec![1.0, 1.0]]).unwrap();
        let hits = tree.knn_search(&q, 2).unwrap();
        assert_eq!(hits[0][0].position, 0);
        assert_eq!(hits[0][1].position, 1);
    }

    #[test]
    fn max_checks_still_returns_k() {
        let rows = grid(100);
        let data = Descriptors::from_f32_rows(&rows).unwrap();
        let mut tree = KdTreeIndex::new(KdTreeParams {
            leaf_size: 4,
            max_checks: Some(8),
        });
        tree.build(data).unwrap();
        let q = Descriptors::from_f32_rows(&[vec![5.0, 5.0, 0.0]]).unwrap();
        let hits = tree.knn_search(&q, 2).unwrap();
        assert_eq!(hits[0].len(), 2);
    }

    #[test]
    fn rejects_binary_rows() {
        let mut tree = KdTreeIndex::new(KdTreeParams::default());
        let data = Descriptors::from_u8_rows(&[vec![1, 2, 3]]).unwrap();
        assert!(tree.build(data).is_err());
    }

    #[test]
    fn rejects_wrong_query_dimension() {
        let mut tree = KdTreeIndex::new(KdTreeParams::default());
        tree.build(Descriptors::from_f32_rows(&[vec![1.0, 2.0]]).unwrap())
            .unwrap();
        let q = Descriptors::from_f32_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(tree.knn_search(&q, 1).is_err());
    }
}

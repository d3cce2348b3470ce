//! Exact brute-force search.
//!
//! Compares every query row with every stored row. Works natively on both
//! element types, so binary descriptors are matched by Hamming distance
//! without conversion.

use super::{Neighbor, Neighbors, SpatialIndex, TopK};
use crate::descriptor::Descriptors;
use crate::distance::row_distance;
use crate::error::{IndexError, Result};

/// Linear-scan "index".
#[derive(Debug, Default)]
pub struct LinearScan {
    data: Option<Descriptors>,
}

impl LinearScan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build directly over `data`.
    pub fn over(data: Descriptors) -> Self {
        Self { data: Some(data) }
    }
}

impl SpatialIndex for LinearScan {
    fn build(&mut self, data: Descriptors) -> Result<()> {
        self.data = Some(data);
        Ok(())
    }

    fn knn_search(&self, query: &Descriptors, k: usize) -> Result<Vec<Neighbors>> {
        let Some(data) = self.data.as_ref() else {
            return Ok(vec![Neighbors::new(); query.rows()]);
        };
        if query.rows() > 0 && query.shape() != data.shape() {
            return Err(IndexError::InvariantViolation(format!(
                "linear scan over {} queried with {}",
                data.shape(),
                query.shape()
            )));
        }

        let results = query
            .iter_rows()
            .map(|q| {
                let mut top = TopK::new(k);
                for (position, row) in data.iter_rows().enumerate() {
                    top.push(Neighbor {
                        position: position as u32,
                        distance: row_distance(q, row),
                    });
                }
                top.into_neighbors()
            })
            .collect();
        Ok(results)
    }

    fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Descriptors::rows)
    }

    fn clear(&mut self) {
        self.data = None;
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}

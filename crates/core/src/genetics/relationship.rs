use indexmap::{IndexMap, IndexSet};

use crate::error::{KinshipError, Result};
use crate::types::DenseMatrix;

use super::amatrix::KinshipMethod;

/// Square, symmetric relationship matrix indexed by line name on both axes.
///
/// Produced fresh by each build and never modified in place; narrowing and
/// rescaling return new matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipMatrix {
    names: IndexSet<String>,
    values: DenseMatrix,
    method: KinshipMethod,
}

impl RelationshipMatrix {
    /// Assemble a matrix from its line names and values.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if `values` is not square with one row per
    /// (distinct) name.
    pub fn from_parts(
        names: IndexSet<String>,
        values: DenseMatrix,
        method: KinshipMethod,
    ) -> Result<Self> {
        let n = names.len();
        if values.nrows() != n || values.ncols() != n {
            return Err(KinshipError::DimensionMismatch {
                expected: n,
                got: values.nrows().max(values.ncols()),
                context: "relationship matrix dimension vs number of line names".into(),
            });
        }
        Ok(Self {
            names,
            values,
            method,
        })
    }

    /// A 0 x 0 matrix.
    pub fn empty(method: KinshipMethod) -> Self {
        Self {
            names: IndexSet::new(),
            values: DenseMatrix::zeros(0, 0),
            method,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn method(&self) -> KinshipMethod {
        self.method
    }

    pub fn values(&self) -> &DenseMatrix {
        &self.values
    }

    /// Line names in row/column order.
    pub fn names(&self) -> &IndexSet<String> {
        &self.names
    }

    pub fn order(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }

    pub fn index_of(&self, line: &str) -> Option<usize> {
        self.names.get_index_of(line)
    }

    pub fn contains(&self, line: &str) -> bool {
        self.names.contains(line)
    }

    /// Relationship between two lines.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Some(self.values[(i, j)])
    }

    /// Relationship of one line with every line, in matrix order.
    pub fn row(&self, line: &str) -> Option<Vec<(&str, f64)>> {
        let i = self.index_of(line)?;
        Some(
            self.names
                .iter()
                .enumerate()
                .map(|(j, name)| (name.as_str(), self.values[(i, j)]))
                .collect(),
        )
    }

    /// Inbreeding coefficient F of a line, recovered from its diagonal
    /// (A\[i, i\] = 1 + F, independent of the method scale).
    pub fn inbreeding(&self, line: &str) -> Option<f64> {
        let i = self.index_of(line)?;
        Some(self.values[(i, i)] / self.method.scale() - 1.0)
    }

    /// Inbreeding coefficients of all lines, in matrix order.
    pub fn inbreeding_coefficients(&self) -> Vec<(&str, f64)> {
        let scale = self.method.scale();
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), self.values[(i, i)] / scale - 1.0))
            .collect()
    }

    /// The same relationships expressed in another method's scale.
    pub fn to_method(&self, method: KinshipMethod) -> RelationshipMatrix {
        if method == self.method {
            return self.clone();
        }
        RelationshipMatrix {
            names: self.names.clone(),
            values: &self.values * (method.scale() / self.method.scale()),
            method,
        }
    }

    /// Symmetric sub-matrix over `subset`, in the order given.
    ///
    /// Pure selection: no relationship is recomputed. Repeated names are
    /// taken once.
    ///
    /// # Errors
    /// Returns `UnknownLine` for the first requested name that is not in the
    /// matrix.
    pub fn extract<S: AsRef<str>>(&self, subset: &[S]) -> Result<RelationshipMatrix> {
        let mut names: IndexSet<String> = IndexSet::with_capacity(subset.len());
        let mut rows: Vec<usize> = Vec::with_capacity(subset.len());

        for line in subset {
            let line = line.as_ref();
            let idx = self
                .index_of(line)
                .ok_or_else(|| KinshipError::UnknownLine(line.to_string()))?;
            if names.insert(line.to_string()) {
                rows.push(idx);
            }
        }

        let k = rows.len();
        let values = DenseMatrix::from_fn(k, k, |i, j| self.values[(rows[i], rows[j])]);

        Ok(RelationshipMatrix {
            names,
            values,
            method: self.method,
        })
    }

    /// Whether A\[i, j\] and A\[j, i\] are bit-for-bit equal everywhere.
    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|j| {
            (0..j).all(|i| self.values[(i, j)].to_bits() == self.values[(j, i)].to_bits())
        })
    }

    /// Nested `row -> column -> value` map in matrix order.
    pub fn to_nested_map(&self) -> IndexMap<String, IndexMap<String, f64>> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cols = self
                    .names
                    .iter()
                    .enumerate()
                    .map(|(j, col)| (col.clone(), self.values[(i, j)]))
                    .collect();
                (row.clone(), cols)
            })
            .collect()
    }
}

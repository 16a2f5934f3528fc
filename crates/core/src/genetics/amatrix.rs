use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{KinshipError, Result};
use crate::types::DenseMatrix;

use super::relationship::RelationshipMatrix;
use super::sort::SortedPedigree;

/// Column length above which a column update is split across rayon workers.
const PARALLEL_THRESHOLD: usize = 4096;

/// Elements per rayon work item.
const CHUNK_SIZE: usize = 1024;

/// Scale of the relationship coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KinshipMethod {
    /// Additive relationship (A) matrix: founders have a diagonal of 1.
    Diploid,
    /// Coancestry matrix, A / 2: founders have a diagonal of 0.5. Used as the
    /// polyploid convention.
    #[default]
    Coancestry,
}

impl KinshipMethod {
    /// Factor applied to the additive relationship matrix.
    pub fn scale(self) -> f64 {
        match self {
            KinshipMethod::Diploid => 1.0,
            KinshipMethod::Coancestry => 0.5,
        }
    }

    /// Display name used in reports.
    pub fn label(self) -> &'static str {
        match self {
            KinshipMethod::Diploid => "Additive Relationship Matrix",
            KinshipMethod::Coancestry => "Coancestry Matrix",
        }
    }
}

impl fmt::Display for KinshipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinshipMethod::Diploid => write!(f, "diploid"),
            KinshipMethod::Coancestry => write!(f, "coancestry"),
        }
    }
}

impl FromStr for KinshipMethod {
    type Err = KinshipError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "diploid" | "additive" | "a" => Ok(KinshipMethod::Diploid),
            "coancestry" | "polyploid" | "poly" => Ok(KinshipMethod::Coancestry),
            other => Err(KinshipError::Data(format!(
                "Unknown kinship method '{}'. Use 'diploid' or 'coancestry'.",
                other
            ))),
        }
    }
}

/// Cooperative cancellation flag for long matrix builds.
///
/// Clones share the flag, so one clone can be handed to the build and
/// another kept by the caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options for a relationship matrix build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    method: KinshipMethod,
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl BuildOptions {
    /// Defaults: coancestry scale, no cancellation, no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: KinshipMethod) -> Self {
        self.method = method;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn kinship_method(&self) -> KinshipMethod {
        self.method
    }

    fn checkpoint(&self, rows_done: usize, rows_total: usize) -> Result<()> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(KinshipError::Cancelled {
                rows_done,
                rows_total,
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(KinshipError::DeadlineExceeded {
                rows_done,
                rows_total,
            });
        }
        Ok(())
    }
}

/// Build the relationship matrix of a sorted pedigree subset.
///
/// Rows and columns follow `sorted.ids`. The matrix is built with
/// [`henderson_fill`] and then scaled according to the chosen
/// [`KinshipMethod`].
///
/// # Errors
///
/// Returns an error if the build is cancelled or passes its deadline, or if
/// the parent index vectors do not match `sorted.ids`.
pub fn build_relationship_matrix(
    sorted: &SortedPedigree,
    options: &BuildOptions,
) -> Result<RelationshipMatrix> {
    let n = sorted.len();
    let started = Instant::now();

    let mut values = henderson_fill(&sorted.sire_idx, &sorted.dam_idx, options)?;
    if options.method == KinshipMethod::Coancestry {
        values *= 0.5;
    }

    debug!(
        "{} for {} lines built in {:.3?}",
        options.method.label(),
        n,
        started.elapsed()
    );

    let names: IndexSet<String> = sorted.ids.iter().cloned().collect();
    RelationshipMatrix::from_parts(names, values, options.method)
}

/// Henderson's tabular method for the additive relationship matrix.
///
/// Individuals must be ordered parents-before-offspring: every known parent
/// index must be smaller than the index of its offspring. For individual
/// *i* with sire *s* and dam *d*:
///
/// - Both parents unknown: A\[i, i\] = 1, A\[i, j\] = 0
/// - One parent *p* known: A\[i, i\] = 1, A\[i, j\] = 0.5 * A\[p, j\]
/// - Both known:           A\[i, i\] = 1 + 0.5 * A\[s, d\],
///   A\[i, j\] = 0.5 * (A\[s, j\] + A\[d, j\])
///
/// for all j < i, with A\[j, i\] = A\[i, j\].
///
/// Storage is a single column-major buffer. Column *i* is computed from the
/// contiguous leading parts of columns *s* and *d* and then copied into row
/// *i*, so both triangles hold the same values and the result is exactly
/// symmetric.
///
/// # Errors
///
/// - `DimensionMismatch` if `sire_idx` and `dam_idx` differ in length.
/// - `Data` if a parent index is not smaller than its offspring's index.
/// - `Cancelled` / `DeadlineExceeded` per `options`.
pub fn henderson_fill(
    sire_idx: &[Option<usize>],
    dam_idx: &[Option<usize>],
    options: &BuildOptions,
) -> Result<DenseMatrix> {
    let n = sire_idx.len();
    if dam_idx.len() != n {
        return Err(KinshipError::DimensionMismatch {
            expected: n,
            got: dam_idx.len(),
            context: "dam index vector vs sire index vector".into(),
        });
    }

    for (i, (s, d)) in sire_idx.iter().zip(dam_idx).enumerate() {
        if let Some(p) = s.iter().chain(d).find(|&&p| p >= i) {
            return Err(KinshipError::Data(format!(
                "Individual {} has parent index {}; parents must precede offspring",
                i, p
            )));
        }
    }

    let mut a = vec![0.0_f64; n * n];

    for i in 0..n {
        options.checkpoint(i, n)?;

        {
            let (done, rest) = a.split_at_mut(i * n);
            let column = &mut rest[..n];
            let (upper, diagonal) = column.split_at_mut(i);

            match (sire_idx[i], dam_idx[i]) {
                (None, None) => {
                    diagonal[0] = 1.0;
                }
                (Some(p), None) | (None, Some(p)) => {
                    diagonal[0] = 1.0;
                    half_of(upper, &done[p * n..p * n + i]);
                }
                (Some(s), Some(d)) => {
                    diagonal[0] = 1.0 + 0.5 * done[d * n + s];
                    half_sum(upper, &done[s * n..s * n + i], &done[d * n..d * n + i]);
                }
            }
        }

        for j in 0..i {
            a[j * n + i] = a[i * n + j];
        }
    }

    Ok(DenseMatrix::from_vec(n, n, a))
}

/// out\[j\] = 0.5 * parent\[j\]
fn half_of(out: &mut [f64], parent: &[f64]) {
    if out.len() >= PARALLEL_THRESHOLD {
        out.par_chunks_mut(CHUNK_SIZE)
            .zip(parent.par_chunks(CHUNK_SIZE))
            .for_each(|(o, p)| half_of_serial(o, p));
    } else {
        half_of_serial(out, parent);
    }
}

fn half_of_serial(out: &mut [f64], parent: &[f64]) {
    for (o, &p) in out.iter_mut().zip(parent) {
        *o = 0.5 * p;
    }
}

/// out\[j\] = 0.5 * (sire\[j\] + dam\[j\])
fn half_sum(out: &mut [f64], sire: &[f64], dam: &[f64]) {
    if out.len() >= PARALLEL_THRESHOLD {
        out.par_chunks_mut(CHUNK_SIZE)
            .zip(sire.par_chunks(CHUNK_SIZE))
            .zip(dam.par_chunks(CHUNK_SIZE))
            .for_each(|((o, s), d)| half_sum_serial(o, s, d));
    } else {
        half_sum_serial(out, sire, dam);
    }
}

fn half_sum_serial(out: &mut [f64], sire: &[f64], dam: &[f64]) {
    for ((o, &s), &d) in out.iter_mut().zip(sire).zip(dam) {
        *o = 0.5 * (s + d);
    }
}

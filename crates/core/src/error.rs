use thiserror::Error;

#[derive(Error, Debug)]
pub enum KinshipError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Column '{0}' not found in pedigree header")]
    ColumnNotFound(String),

    #[error("Line '{0}' is not present in the relationship matrix")]
    UnknownLine(String),

    #[error("Dimension mismatch: expected {expected}, got {got} in {context}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    #[error("Relationship matrix build cancelled after {rows_done} of {rows_total} rows")]
    Cancelled { rows_done: usize, rows_total: usize },

    #[error("Relationship matrix build hit its deadline after {rows_done} of {rows_total} rows")]
    DeadlineExceeded { rows_done: usize, rows_total: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, KinshipError>;

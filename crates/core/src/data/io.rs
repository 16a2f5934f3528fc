use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexSet;
use log::{info, warn};

use crate::error::{KinshipError, Result};
use crate::genetics::{KinshipMethod, PedigreeRecord, PedigreeTable, RelationshipMatrix};
use crate::types::DenseMatrix;

/// Header of the line name column.
pub const LINE_NAME_COLUMN: &str = "LineName";
/// Header of the male parent column.
pub const MALE_PARENT_COLUMN: &str = "MaleParent";
/// Header of the female parent column.
pub const FEMALE_PARENT_COLUMN: &str = "FemaleParent";

/// Field delimiter of a pedigree or matrix file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// Tab if the header line contains one, comma otherwise.
    #[default]
    Auto,
    Tab,
    Comma,
}

impl Delimiter {
    fn resolve(self, text: &str) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
            Delimiter::Auto => {
                let header = text.lines().next().unwrap_or("");
                if header.contains('\t') {
                    b'\t'
                } else {
                    b','
                }
            }
        }
    }
}

/// Options for reading a pedigree table.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    delimiter: Delimiter,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Decode file contents as UTF-8, falling back to Latin-1.
///
/// Breeding program exports are frequently Latin-1; every byte sequence is
/// valid Latin-1, so decoding cannot fail.
fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

impl PedigreeTable {
    /// Read a pedigree from a tab- or comma-delimited file.
    ///
    /// See [`PedigreeTable::from_reader`] for the expected layout.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or lacks a required column.
    pub fn from_path<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, options)
    }

    /// Read a pedigree from delimited text.
    ///
    /// The header must contain `LineName`, `MaleParent` and `FemaleParent`
    /// (case-sensitive, any order; other columns are ignored). Fields are
    /// trimmed. Unknown parents (empty, `NA`, `NaN`, `unknown`, ...) become
    /// `None`. Rows with an empty line name are skipped. Short rows are
    /// accepted with the missing parent fields treated as unknown.
    ///
    /// # Errors
    /// - `ColumnNotFound` if a required header is missing.
    /// - `Csv` / `Io` for malformed or unreadable input.
    pub fn from_reader<R: Read>(mut reader: R, options: &ReadOptions) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let text = decode_text(bytes);
        let delimiter = options.delimiter.resolve(&text);

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = csv_reader.headers()?.clone();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| KinshipError::ColumnNotFound(name.to_string()))
        };
        let line_col = column(LINE_NAME_COLUMN)?;
        let male_col = column(MALE_PARENT_COLUMN)?;
        let female_col = column(FEMALE_PARENT_COLUMN)?;

        let mut table = PedigreeTable::new();
        let mut skipped = 0usize;

        for result in csv_reader.records() {
            let row = result?;
            let line = row.get(line_col).unwrap_or("");
            if line.is_empty() {
                skipped += 1;
                continue;
            }
            table.push(PedigreeRecord::new(
                line,
                row.get(male_col),
                row.get(female_col),
            ));
        }

        if skipped > 0 {
            warn!("skipped {} pedigree row(s) with an empty {}", skipped, LINE_NAME_COLUMN);
        }
        info!("read {} pedigree rows", table.len());

        Ok(table)
    }
}

impl RelationshipMatrix {
    /// Write the matrix as a delimited table: a header row of line names
    /// (after an empty corner cell), then one row per line led by its name.
    ///
    /// Values use the shortest representation that parses back to the same
    /// `f64`.
    pub fn write_delimited<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);

        let mut header = Vec::with_capacity(self.len() + 1);
        header.push(String::new());
        header.extend(self.names().iter().cloned());
        out.write_record(&header)?;

        let values = self.values();
        for (i, name) in self.names().iter().enumerate() {
            let mut row = Vec::with_capacity(self.len() + 1);
            row.push(name.clone());
            row.extend((0..self.len()).map(|j| values[(i, j)].to_string()));
            out.write_record(&row)?;
        }

        out.flush()?;
        Ok(())
    }

    /// Write the matrix as CSV. See [`RelationshipMatrix::write_delimited`].
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_delimited(file, b',')
    }

    /// Read a matrix written by [`RelationshipMatrix::write_delimited`].
    ///
    /// The file does not record the method, so the caller supplies it.
    ///
    /// # Errors
    /// Returns `Data` if the header repeats a name, row labels do not repeat
    /// the header order or a value does not parse. Returns
    /// `DimensionMismatch` if the table is not square.
    pub fn read_delimited<R: Read>(
        mut reader: R,
        delimiter: Delimiter,
        method: KinshipMethod,
    ) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let text = decode_text(bytes);

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter.resolve(&text))
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = csv_reader.headers()?.clone();
        let names: IndexSet<String> = headers.iter().skip(1).map(str::to_string).collect();
        let n = names.len();
        if n != headers.len().saturating_sub(1) {
            return Err(KinshipError::Data(format!(
                "Matrix header repeats a line name ({} columns, {} distinct names)",
                headers.len().saturating_sub(1),
                n
            )));
        }
        let mut data = Vec::with_capacity(n * n);
        let mut n_rows = 0usize;

        for result in csv_reader.records() {
            let row = result?;
            let label = row.get(0).unwrap_or("");
            if names.get_index_of(label) != Some(n_rows) {
                return Err(KinshipError::Data(format!(
                    "Row {} is labelled '{}' but the header expects '{}'",
                    n_rows + 1,
                    label,
                    names.get_index(n_rows).map(String::as_str).unwrap_or("")
                )));
            }
            for field in row.iter().skip(1) {
                let value = field.parse::<f64>().map_err(|_| {
                    KinshipError::Data(format!("Invalid value '{}' in row '{}'", field, label))
                })?;
                data.push(value);
            }
            n_rows += 1;
        }

        if n_rows != n {
            return Err(KinshipError::DimensionMismatch {
                expected: n,
                got: n_rows,
                context: "matrix rows vs header columns".into(),
            });
        }

        if data.len() != n * n {
            return Err(KinshipError::DimensionMismatch {
                expected: n * n,
                got: data.len(),
                context: "matrix values vs header columns squared".into(),
            });
        }

        // Rows were read in row-major order.
        let values = DenseMatrix::from_row_slice(n, n, &data);
        RelationshipMatrix::from_parts(names, values, method)
    }

    /// Read a CSV matrix file. See [`RelationshipMatrix::read_delimited`].
    pub fn from_csv<P: AsRef<Path>>(path: P, method: KinshipMethod) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::read_delimited(file, Delimiter::Comma, method)
    }
}

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::dataset::Table;
use crate::error::DataLoadError;

pub const CSV_FILE_PATH: &str = "bank.csv";
const CSV_DELIMITER: u8 = b';';

const COLUMNS: &[&str] = &[
    "age", "job", "marital", "education", "contact", "campaign", "previous", "poutcome", "y",
];

/// One customer contact. Columns of the source file that are not named here
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Record {
    pub age: i64,
    pub job: String,
    pub marital: String,
    pub education: String,
    pub contact: String,
    pub campaign: i64,
    pub previous: i64,
    pub poutcome: String,
    pub y: String,
}

impl Record {
    pub fn converted(&self) -> bool {
        self.y == "yes"
    }

    fn normalized(mut self) -> Self {
        for field in [
            &mut self.job,
            &mut self.marital,
            &mut self.education,
            &mut self.contact,
            &mut self.poutcome,
            &mut self.y,
        ] {
            *field = field.to_lowercase();
        }
        self
    }
}

pub fn read_data(path: &Path) -> Result<Table, DataLoadError> {
    let file = File::open(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = rdr.headers().map_err(|source| DataLoadError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(column) = COLUMNS.iter().copied().find(|c| !headers.iter().any(|h| h == *c)) {
        return Err(DataLoadError::MissingColumn {
            path: path.to_path_buf(),
            column,
        });
    }

    let mut records = Vec::<Record>::new();
    for result in rdr.deserialize() {
        let record: Record = result.map_err(|source| DataLoadError::Malformed {
            path: path.to_path_buf(),
            line: source.position().map_or(0, |p| p.line()),
            source,
        })?;
        records.push(record.normalized());
    }
    debug!(rows = records.len(), path = %path.display(), "parsed csv");
    Ok(Table::new(records))
}

/// Holds the loaded table for the lifetime of the process. The table is read
/// once and handed out as a shared, read-only `Arc`.
pub struct TableCache {
    path: PathBuf,
    table: Option<Arc<Table>>,
    loaded_at: Option<DateTime<Local>>,
}

impl TableCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TableCache {
            path: path.into(),
            table: None,
            loaded_at: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loaded_at(&self) -> Option<DateTime<Local>> {
        self.loaded_at
    }

    pub fn get(&mut self) -> Result<Arc<Table>, DataLoadError> {
        match &self.table {
            Some(table) => Ok(Arc::clone(table)),
            None => self.reload(),
        }
    }

    pub fn invalidate(&mut self) {
        debug!(path = %self.path.display(), "table cache invalidated");
        self.table = None;
        self.loaded_at = None;
    }

    /// Re-reads the file. On failure the previously cached table, if any, is
    /// left in place.
    pub fn reload(&mut self) -> Result<Arc<Table>, DataLoadError> {
        let table = Arc::new(read_data(&self.path)?);
        self.invalidate();
        info!(rows = table.len(), path = %self.path.display(), "table loaded");
        self.table = Some(Arc::clone(&table));
        self.loaded_at = Some(Local::now());
        Ok(table)
    }
}

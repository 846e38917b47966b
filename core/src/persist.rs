use crate::error::IndexError;
use crate::DocId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Filesystem layout under one index root: final index files, partial SPIMI
/// dumps, and JSON settings snapshots each live in their own subdirectory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn indexes(&self) -> PathBuf {
        self.root.join("indexes")
    }

    pub fn partials(&self) -> PathBuf {
        self.root.join("partials")
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings")
    }

    pub fn create_dirs(&self) -> Result<(), IndexError> {
        create_dir_all(self.indexes())?;
        create_dir_all(self.partials())?;
        create_dir_all(self.settings())?;
        Ok(())
    }

    pub fn verify(&self) -> Result<(), IndexError> {
        for dir in [self.indexes(), self.partials(), self.settings()] {
            if !dir.is_dir() {
                return Err(IndexError::Config(dir));
            }
        }
        Ok(())
    }
}

/// Per-zone snapshot: the final-index lookup tables plus the partial-file
/// bookkeeping needed to resume an interrupted merge.
#[derive(Debug, Serialize, Deserialize)]
pub struct ZoneSettings {
    pub index_file_name: String,
    pub term_offsets: HashMap<String, u64>,
    pub document_term_counts: HashMap<String, usize>,
    pub partial_terms: Vec<String>,
    pub partial_file_names: Vec<String>,
    pub partial_offsets: HashMap<String, HashMap<String, u64>>,
    pub partial_file_counter: usize,
}

/// Corpus-level snapshot: doc id maps and the link graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct TieredSettings {
    pub created_at: String,
    pub doc_count: u32,
    pub doc_id_to_url: HashMap<DocId, String>,
    pub url_to_doc_id: HashMap<String, DocId>,
    pub doc_in_edges: HashMap<DocId, HashSet<DocId>>,
    pub doc_out_edges: HashMap<DocId, HashSet<DocId>>,
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), value)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub fn rfc3339_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into())
}

use crate::error::IndexError;
use crate::persist::{load_json, save_json, IndexPaths, ZoneSettings};
use crate::postings::PostingsList;
use crate::{DocId, Position};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Separates the term from its serialized postings on each index line.
pub(crate) const TERM_DELIM: char = '=';

/// Default bound on buffered term positions before a partial dump.
pub const MAX_PARTIAL_POSITIONS: usize = 5_000_000;

#[derive(Debug, Clone, Copy)]
pub struct SortWeights {
    pub page_rank: f64,
    pub global_tf_idf: f64,
    pub local_tf_idf: f64,
}

/// Static descriptor of one zone's indexing behavior.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub name: &'static str,
    pub max_n_gram: usize,
    pub sort_weights: SortWeights,
    pub postings_list_size_limit: Option<usize>,
    pub store_positions: bool,
    pub max_partial_positions: usize,
}

/// One zone's inverted index: an in-memory SPIMI buffer that spills to
/// partial dump files, merged into a single term-ordered final file with a
/// term -> byte-offset lookup for random access.
pub struct ZoneIndex {
    config: ZoneConfig,
    paths: IndexPaths,
    index_file_name: String,
    settings_file_name: String,
    index_file: File,

    term_offsets: HashMap<String, u64>,
    document_term_counts: HashMap<String, usize>,

    buffer: HashMap<String, PostingsList>,
    buffered_positions: usize,
    partial_terms: HashSet<String>,
    partial_file_names: Vec<String>,
    partial_offsets: HashMap<String, HashMap<String, u64>>,
    partial_file_counter: usize,
}

impl ZoneIndex {
    /// Open (or create) the zone's final index file and load any settings
    /// snapshot left by a previous build.
    pub fn new(config: ZoneConfig, paths: IndexPaths) -> Result<Self, IndexError> {
        paths.verify()?;

        let prefix = if config.store_positions { "positional_" } else { "" };
        let index_file_name = format!("{prefix}{}.index", config.name);
        let settings_file_name = format!("{}_settings.json", config.name);

        let index_path = paths.indexes().join(&index_file_name);
        if !index_path.is_file() {
            File::create(&index_path)?;
        }
        let index_file = File::open(&index_path)?;

        let mut zone = Self {
            config,
            paths,
            index_file_name,
            settings_file_name,
            index_file,
            term_offsets: HashMap::new(),
            document_term_counts: HashMap::new(),
            buffer: HashMap::new(),
            buffered_positions: 0,
            partial_terms: HashSet::new(),
            partial_file_names: Vec::new(),
            partial_offsets: HashMap::new(),
            partial_file_counter: 0,
        };

        let settings_path = zone.paths.settings().join(&zone.settings_file_name);
        if settings_path.is_file() {
            zone.load_settings(&settings_path)?;
            tracing::debug!(
                zone = zone.config.name,
                terms = zone.term_offsets.len(),
                "loaded zone settings"
            );
        }
        Ok(zone)
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn index_file_path(&self) -> PathBuf {
        self.paths.indexes().join(&self.index_file_name)
    }

    pub fn term_count(&self) -> usize {
        self.document_term_counts.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.document_term_counts.contains_key(term)
    }

    /// Post-merge (post-truncation) number of docs holding `term`.
    pub fn document_frequency(&self, term: &str) -> Option<usize> {
        self.document_term_counts.get(term).copied()
    }

    /// Reset the partial-index bookkeeping ahead of a rebuild. The final
    /// index file stays in place until the merge replaces it.
    pub fn prep_for_build(&mut self) {
        self.buffer.clear();
        self.buffered_positions = 0;
        self.partial_terms.clear();
        self.partial_file_names.clear();
        self.partial_offsets.clear();
        self.partial_file_counter = 0;
    }

    /// Buffer one posting; spills to a new partial file once the buffered
    /// position count crosses the configured bound. Returns whether a spill
    /// happened.
    pub fn add_term(&mut self, term: &str, doc_id: DocId, positions: &[Position]) -> Result<bool, IndexError> {
        self.buffer
            .entry(term.to_string())
            .or_insert_with(|| PostingsList::new(self.config.store_positions))
            .create_posting(doc_id, positions);
        self.buffered_positions += if self.config.store_positions { positions.len() } else { 1 };
        self.partial_terms.insert(term.to_string());
        self.flush_if_full()
    }

    /// Buffer a count-only posting (anchor text keeps no real positions).
    pub fn add_counted_term(&mut self, term: &str, doc_id: DocId, count: u32) -> Result<bool, IndexError> {
        self.buffer
            .entry(term.to_string())
            .or_insert_with(|| PostingsList::new(self.config.store_positions))
            .create_counted_posting(doc_id, count);
        self.buffered_positions += 1;
        self.partial_terms.insert(term.to_string());
        self.flush_if_full()
    }

    fn flush_if_full(&mut self) -> Result<bool, IndexError> {
        if self.buffered_positions < self.config.max_partial_positions {
            return Ok(false);
        }
        self.dump_partial()?;
        Ok(true)
    }

    /// Write the buffer as one `term=<raw postings>` line per term, keeping
    /// a term -> offset map for the new file, then release the buffer.
    fn dump_partial(&mut self) -> Result<(), IndexError> {
        let file_name = format!("partial_{}{}.dump", self.config.name, self.partial_file_counter);
        let path = self.paths.partials().join(&file_name);
        tracing::debug!(
            zone = self.config.name,
            file = %file_name,
            terms = self.buffer.len(),
            positions = self.buffered_positions,
            "dumping partial index"
        );

        let mut offsets: HashMap<String, u64> = HashMap::new();
        let mut writer = BufWriter::new(File::create(&path)?);
        let mut offset = 0u64;
        for (term, list) in &self.buffer {
            offsets.insert(term.clone(), offset);
            let line = format!("{term}{TERM_DELIM}{}\n", list.dump_raw());
            writer.write_all(line.as_bytes())?;
            offset += line.len() as u64;
        }
        writer.flush()?;

        self.partial_file_names.push(file_name.clone());
        self.partial_offsets.insert(file_name, offsets);
        self.partial_file_counter += 1;
        self.buffer.clear();
        self.buffered_positions = 0;
        Ok(())
    }

    /// Stream every recorded term through the partial dumps, score and sort
    /// the merged postings, and write the final term-ordered index file.
    ///
    /// The full-body zone merges with `reference = None` (its local TF-IDF
    /// is copied into global); every other zone joins global TF-IDF from the
    /// full-body index, except anchor which also passes `None`.
    pub fn merge(
        &mut self,
        doc_count: usize,
        reference: Option<&ZoneIndex>,
        page_ranks: &[f64],
    ) -> Result<(), IndexError> {
        if !self.buffer.is_empty() {
            self.dump_partial()?;
        }

        self.term_offsets.clear();
        self.document_term_counts.clear();

        if self.partial_file_names.is_empty() {
            return Err(IndexError::EmptyBuild(self.config.name.to_string()));
        }

        tracing::info!(
            zone = self.config.name,
            partials = self.partial_file_names.len(),
            terms = self.partial_terms.len(),
            "merging partial indexes"
        );

        let final_path = self.paths.indexes().join(&self.index_file_name);
        let temp_path = self.paths.indexes().join(format!("{}.tmp", self.index_file_name));

        // one scoped batch of partial handles, all released together
        let mut partials = Vec::with_capacity(self.partial_file_names.len());
        for name in &self.partial_file_names {
            partials.push((name.as_str(), File::open(self.paths.partials().join(name))?));
        }

        let mut terms: Vec<&String> = self.partial_terms.iter().collect();
        terms.sort_unstable();

        let mut writer = BufWriter::new(File::create(&temp_path)?);
        let mut offset = 0u64;
        for term in terms {
            let mut fragments = Vec::new();
            for (name, file) in &partials {
                let Some(pos) = self.partial_offsets.get(*name).and_then(|lut| lut.get(term)) else {
                    continue;
                };
                fragments.push(read_term_line(file, *pos, term)?);
            }

            let mut merged = PostingsList::from_fragments(self.config.store_positions, &fragments)?;
            merged.compute_local_tf_idf(doc_count, reference.is_none());
            if let Some(reference) = reference {
                let reference_list = reference.retrieve(term)?.ok_or_else(|| {
                    IndexError::MissingReferenceDoc(
                        merged.postings().first().map(|p| p.doc_id).unwrap_or_default(),
                    )
                })?;
                merged.add_global_tf_idf(&reference_list)?;
            }
            merged.set_page_rankings(page_ranks);

            let weights = self.config.sort_weights;
            merged.sort(weights.page_rank, weights.global_tf_idf, weights.local_tf_idf);
            if let Some(limit) = self.config.postings_list_size_limit {
                merged.limit(limit);
            }

            self.term_offsets.insert(term.clone(), offset);
            self.document_term_counts.insert(term.clone(), merged.len());
            let line = format!("{term}{TERM_DELIM}{}\n", merged.dump());
            writer.write_all(line.as_bytes())?;
            offset += line.len() as u64;
        }
        writer.flush()?;
        drop(writer);
        drop(partials);

        fs::rename(&temp_path, &final_path)?;
        self.index_file = File::open(&final_path)?;
        self.save_settings()?;
        Ok(())
    }

    /// Seek to the term's cached offset, read one line, verify the term
    /// prefix, and deserialize. `None` means the zone has no such term.
    pub fn retrieve(&self, term: &str) -> Result<Option<PostingsList>, IndexError> {
        let Some(&offset) = self.term_offsets.get(term) else {
            return Ok(None);
        };
        let body = read_term_line(&self.index_file, offset, term)?;
        Ok(Some(PostingsList::from_line(self.config.store_positions, &body)?))
    }

    fn load_settings(&mut self, path: &Path) -> Result<(), IndexError> {
        let settings: ZoneSettings = load_json(path)?;
        self.index_file_name = settings.index_file_name;
        self.term_offsets = settings.term_offsets;
        self.document_term_counts = settings.document_term_counts;
        self.partial_terms = settings.partial_terms.into_iter().collect();
        self.partial_file_names = settings.partial_file_names;
        self.partial_offsets = settings.partial_offsets;
        self.partial_file_counter = settings.partial_file_counter;
        self.index_file = File::open(self.paths.indexes().join(&self.index_file_name))?;
        Ok(())
    }

    fn save_settings(&self) -> Result<(), IndexError> {
        let settings = ZoneSettings {
            index_file_name: self.index_file_name.clone(),
            term_offsets: self.term_offsets.clone(),
            document_term_counts: self.document_term_counts.clone(),
            partial_terms: self.partial_terms.iter().cloned().collect(),
            partial_file_names: self.partial_file_names.clone(),
            partial_offsets: self.partial_offsets.clone(),
            partial_file_counter: self.partial_file_counter,
        };
        save_json(&self.paths.settings().join(&self.settings_file_name), &settings)
    }
}

/// Read the line starting at `offset` and return its postings body after
/// checking that it belongs to `term`.
fn read_term_line(file: &File, offset: u64, term: &str) -> Result<String, IndexError> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(offset))?;
    let mut line = String::new();
    BufReader::new(handle).read_line(&mut line)?;
    let line = line.trim_end_matches('\n');
    let Some((index_term, body)) = line.split_once(TERM_DELIM) else {
        return Err(IndexError::IndexCorrupt(format!(
            "line at offset {offset} has no {TERM_DELIM:?} delimiter"
        )));
    };
    if index_term != term {
        return Err(IndexError::IndexCorrupt(format!(
            "line for term {term:?} begins with {index_term:?}"
        )));
    }
    Ok(body.to_string())
}

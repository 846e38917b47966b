use crate::error::IndexError;
use crate::persist::{load_json, rfc3339_now, save_json, IndexPaths, TieredSettings};
use crate::tokenizer;
use crate::zone::{SortWeights, ZoneConfig, ZoneIndex, MAX_PARTIAL_POSITIONS};
use crate::DocId;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

pub const PAGE_RANK_DAMPING: f64 = 0.85;
pub const DEFAULT_PAGE_RANK_ITERATIONS: usize = 5;
pub const DEFAULT_MAX_N_GRAM: usize = 3;

/// Two SimHashes within this Hamming distance mark a near-duplicate pair
/// (similarity of at least 31/32).
pub const NEAR_DUPLICATE_DISTANCE: u32 = 1;

const TIERED_SETTINGS_FILE: &str = "tiered_settings.json";

/// The six textual zones, in tier priority order with the full-body index
/// last (it is merged first to establish global TF-IDF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Title = 0,
    Anchor = 1,
    Header = 2,
    Bold = 3,
    Limited = 4,
    Full = 5,
}

impl Zone {
    pub const ALL: [Zone; 6] =
        [Zone::Title, Zone::Anchor, Zone::Header, Zone::Bold, Zone::Limited, Zone::Full];

    fn config(self, max_n_gram: usize) -> ZoneConfig {
        let (name, limit, store_positions, sort_weights) = match self {
            Zone::Title => (
                "title",
                Some(70),
                false,
                SortWeights { page_rank: 0.40, global_tf_idf: 0.20, local_tf_idf: 0.40 },
            ),
            Zone::Anchor => (
                "anchor",
                Some(90),
                false,
                SortWeights { page_rank: 0.40, global_tf_idf: 0.00, local_tf_idf: 0.60 },
            ),
            Zone::Header => (
                "header",
                Some(120),
                true,
                SortWeights { page_rank: 0.40, global_tf_idf: 0.20, local_tf_idf: 0.40 },
            ),
            Zone::Bold => (
                "bold",
                Some(150),
                true,
                SortWeights { page_rank: 0.40, global_tf_idf: 0.20, local_tf_idf: 0.40 },
            ),
            Zone::Limited => (
                "limited",
                Some(200),
                true,
                SortWeights { page_rank: 0.40, global_tf_idf: 0.60, local_tf_idf: 0.00 },
            ),
            Zone::Full => (
                "full_text",
                None,
                true,
                SortWeights { page_rank: 0.40, global_tf_idf: 0.60, local_tf_idf: 0.00 },
            ),
        };
        ZoneConfig {
            name,
            max_n_gram,
            sort_weights,
            postings_list_size_limit: limit,
            store_positions,
            max_partial_positions: MAX_PARTIAL_POSITIONS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CorpusDoc {
    url: String,
    content: String,
    encoding: String,
}

/// Owns the six zone indexes, the doc id maps, and the link graph, and runs
/// the whole build pipeline over a corpus directory.
pub struct TieredIndexSet {
    paths: IndexPaths,
    max_n_gram: usize,
    page_rank_iterations: usize,
    zones: Vec<ZoneIndex>,

    doc_count: u32,
    doc_id_to_url: HashMap<DocId, String>,
    url_to_doc_id: HashMap<String, DocId>,
    doc_in_edges: HashMap<DocId, HashSet<DocId>>,
    doc_out_edges: HashMap<DocId, HashSet<DocId>>,
}

impl TieredIndexSet {
    /// Open the zone indexes under `paths`, loading any settings snapshot a
    /// previous build left behind.
    pub fn new(paths: IndexPaths, max_n_gram: usize, page_rank_iterations: usize) -> Result<Self, IndexError> {
        paths.verify()?;
        let zones = Zone::ALL
            .iter()
            .map(|zone| ZoneIndex::new(zone.config(max_n_gram), paths.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut set = Self {
            paths,
            max_n_gram,
            page_rank_iterations,
            zones,
            doc_count: 0,
            doc_id_to_url: HashMap::new(),
            url_to_doc_id: HashMap::new(),
            doc_in_edges: HashMap::new(),
            doc_out_edges: HashMap::new(),
        };
        let settings_path = set.paths.settings().join(TIERED_SETTINGS_FILE);
        if settings_path.is_file() {
            set.load_settings(&settings_path)?;
            tracing::debug!(docs = set.doc_count, "loaded tiered settings");
        }
        Ok(set)
    }

    pub fn zone(&self, zone: Zone) -> &ZoneIndex {
        &self.zones[zone as usize]
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count as usize
    }

    pub fn max_n_gram(&self) -> usize {
        self.max_n_gram
    }

    pub fn doc_url(&self, doc_id: DocId) -> Option<&str> {
        self.doc_id_to_url.get(&doc_id).map(String::as_str)
    }

    /// Build all six zone indexes from the corpus directory: first pass
    /// dedups and tokenizes, second pass extracts the link graph and anchor
    /// text, then PageRank runs and the zones merge in dependency order.
    pub fn build_tiered_indexes(&mut self, corpus_dir: &Path) -> Result<(), IndexError> {
        if !corpus_dir.is_dir() {
            return Err(IndexError::Config(corpus_dir.to_path_buf()));
        }

        for zone in &mut self.zones {
            zone.prep_for_build();
        }
        self.doc_count = 0;
        self.doc_id_to_url.clear();
        self.url_to_doc_id.clear();
        self.doc_in_edges.clear();
        self.doc_out_edges.clear();

        let mut processed_urls: HashSet<String> = HashSet::new();
        let mut content_hashes: HashMap<u32, String> = HashMap::new();
        let mut fingerprints: HashMap<DocId, u32> = HashMap::new();
        let mut exact_duplicates = 0usize;
        let mut near_duplicates = 0usize;

        for path in corpus_files(corpus_dir) {
            let Some(doc) = read_corpus_doc(&path) else { continue };
            let Some(url) = defrag_url(&doc.url) else {
                tracing::warn!(file = %path.display(), url = %doc.url, "skipping corpus entry with invalid url");
                continue;
            };
            if !processed_urls.insert(url.clone()) {
                tracing::debug!(%url, "url already processed, skipping");
                continue;
            }

            let content_hash = crc32fast::hash(doc.content.as_bytes());
            if let Some(prior) = content_hashes.get(&content_hash) {
                tracing::info!(%url, prior = %prior, "exact duplicate content, skipping");
                exact_duplicates += 1;
                continue;
            }
            content_hashes.insert(content_hash, url.clone());

            let simhash = tokenizer::get_doc_simhash(&doc.content);
            if let Some(near_doc_id) = find_near_duplicate(&fingerprints, simhash) {
                let prior = self.doc_url(near_doc_id).unwrap_or("");
                tracing::info!(%url, prior, "near duplicate content, skipping");
                near_duplicates += 1;
                continue;
            }

            let doc_id = self.add_doc(url);
            fingerprints.insert(doc_id, simhash);
            tracing::debug!(doc_id, "indexing document");

            let tokens = tokenizer::tokenize_html(&doc.content, &doc.encoding, self.max_n_gram);
            for (term, positions) in &tokens.title {
                self.zones[Zone::Title as usize].add_term(term, doc_id, positions)?;
            }
            for (term, positions) in &tokens.header {
                self.zones[Zone::Header as usize].add_term(term, doc_id, positions)?;
            }
            for (term, positions) in &tokens.bold {
                self.zones[Zone::Bold as usize].add_term(term, doc_id, positions)?;
            }
            for (term, positions) in &tokens.text {
                self.zones[Zone::Limited as usize].add_term(term, doc_id, positions)?;
                self.zones[Zone::Full as usize].add_term(term, doc_id, positions)?;
            }
        }

        tracing::info!(
            docs = self.doc_count,
            exact_duplicates,
            near_duplicates,
            "corpus pass complete"
        );

        self.scan_links(corpus_dir)?;
        let page_ranks = self.compute_page_rank();

        let doc_count = self.doc_count as usize;
        let (tiers, full) = self.zones.split_at_mut(Zone::Full as usize);
        let full = &mut full[0];
        full.merge(doc_count, None, &page_ranks)?;
        for (index, zone) in tiers.iter_mut().enumerate() {
            let reference = if index == Zone::Anchor as usize { None } else { Some(&*full) };
            match zone.merge(doc_count, reference, &page_ranks) {
                Ok(()) => {}
                Err(IndexError::EmptyBuild(name)) => {
                    tracing::warn!(zone = %name, "zone produced no postings, leaving it empty");
                }
                Err(err) => return Err(err),
            }
        }

        self.save_settings()?;
        Ok(())
    }

    /// Second corpus pass: build the inter-document link graph and feed the
    /// aggregated anchor n-gram counts into the anchor zone.
    fn scan_links(&mut self, corpus_dir: &Path) -> Result<(), IndexError> {
        let mut anchor_counts: HashMap<DocId, HashMap<String, u32>> = HashMap::new();

        for path in corpus_files(corpus_dir) {
            let Some(doc) = read_corpus_doc(&path) else { continue };
            let Some(url) = defrag_url(&doc.url) else { continue };
            let Some(&doc_id) = self.url_to_doc_id.get(&url) else { continue };
            let Ok(base) = Url::parse(&url) else { continue };

            for (href, term_counts) in tokenizer::get_page_links(&doc.content, self.max_n_gram) {
                let Some(target_url) = resolve_link(&base, &href) else { continue };
                let Some(&target_doc_id) = self.url_to_doc_id.get(&target_url) else { continue };

                self.doc_in_edges.entry(target_doc_id).or_default().insert(doc_id);
                self.doc_out_edges.entry(doc_id).or_default().insert(target_doc_id);

                let counts = anchor_counts.entry(target_doc_id).or_default();
                for (term, count) in term_counts {
                    *counts.entry(term).or_insert(0) += count;
                }
            }
        }

        let anchor = &mut self.zones[Zone::Anchor as usize];
        for (target_doc_id, term_counts) in anchor_counts {
            for (term, count) in term_counts {
                anchor.add_counted_term(&term, target_doc_id, count)?;
            }
        }
        tracing::info!(linked_docs = self.doc_in_edges.len(), "link graph constructed");
        Ok(())
    }

    /// Iterative PageRank over the link graph. Documents without in-edges
    /// keep their current value for the iteration.
    pub fn compute_page_rank(&self) -> Vec<f64> {
        let docs = self.doc_count as usize;
        let mut ranks = vec![1.0f64; docs];
        for _ in 0..self.page_rank_iterations {
            for doc_id in 0..docs {
                let Some(sources) = self.doc_in_edges.get(&(doc_id as DocId)) else { continue };
                ranks[doc_id] = (1.0 - PAGE_RANK_DAMPING)
                    + PAGE_RANK_DAMPING
                        * sources
                            .iter()
                            .map(|source| 1.0 / self.doc_out_edges[source].len() as f64)
                            .sum::<f64>();
            }
        }
        ranks
    }

    fn add_doc(&mut self, url: String) -> DocId {
        let doc_id = self.doc_count;
        self.doc_id_to_url.insert(doc_id, url.clone());
        self.url_to_doc_id.insert(url, doc_id);
        self.doc_count += 1;
        doc_id
    }

    fn load_settings(&mut self, path: &Path) -> Result<(), IndexError> {
        let settings: TieredSettings = load_json(path)?;
        self.doc_count = settings.doc_count;
        self.doc_id_to_url = settings.doc_id_to_url;
        self.url_to_doc_id = settings.url_to_doc_id;
        self.doc_in_edges = settings.doc_in_edges;
        self.doc_out_edges = settings.doc_out_edges;
        Ok(())
    }

    fn save_settings(&self) -> Result<(), IndexError> {
        let settings = TieredSettings {
            created_at: rfc3339_now(),
            doc_count: self.doc_count,
            doc_id_to_url: self.doc_id_to_url.clone(),
            url_to_doc_id: self.url_to_doc_id.clone(),
            doc_in_edges: self.doc_in_edges.clone(),
            doc_out_edges: self.doc_out_edges.clone(),
        };
        save_json(&self.paths.settings().join(TIERED_SETTINGS_FILE), &settings)
    }
}

/// All `*.json` files under the corpus directory, in file-name order so doc
/// id assignment is deterministic.
fn corpus_files(corpus_dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(corpus_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
}

fn read_corpus_doc(path: &Path) -> Option<CorpusDoc> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(file = %path.display(), %err, "skipping unreadable corpus file");
            return None;
        }
    };
    let doc: CorpusDoc = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(file = %path.display(), %err, "skipping corpus file, expected a url/content/encoding object");
            return None;
        }
    };
    if doc.content.is_empty() {
        tracing::warn!(file = %path.display(), "skipping corpus file with empty content");
        return None;
    }
    if doc.encoding.is_empty() {
        tracing::warn!(file = %path.display(), "corpus file has no encoding, assuming utf-8");
    }
    Some(doc)
}

fn defrag_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let mut url = Url::parse(href).or_else(|_| base.join(href)).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

fn find_near_duplicate(fingerprints: &HashMap<DocId, u32>, simhash: u32) -> Option<DocId> {
    fingerprints
        .iter()
        .find(|(_, prior)| (simhash ^ **prior).count_ones() <= NEAR_DUPLICATE_DISTANCE)
        .map(|(doc_id, _)| *doc_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn empty_set(dir: &TempDir) -> TieredIndexSet {
        let paths = IndexPaths::new(dir.path());
        paths.create_dirs().unwrap();
        TieredIndexSet::new(paths, 1, DEFAULT_PAGE_RANK_ITERATIONS).unwrap()
    }

    #[test]
    fn near_duplicate_matches_within_one_bit() {
        let fingerprints: HashMap<DocId, u32> = [(4, 0b1010_1010)].into_iter().collect();
        assert_eq!(find_near_duplicate(&fingerprints, 0b1010_1010), Some(4));
        assert_eq!(find_near_duplicate(&fingerprints, 0b1010_1011), Some(4));
        assert_eq!(find_near_duplicate(&fingerprints, 0b1010_1001), None);
    }

    #[test]
    fn page_rank_sums_inverse_out_degrees() {
        let dir = TempDir::new().unwrap();
        let mut set = empty_set(&dir);
        // 0 -> 1, 0 -> 2, 1 -> 2
        set.doc_count = 3;
        set.doc_in_edges.insert(1, [0].into_iter().collect());
        set.doc_in_edges.insert(2, [0, 1].into_iter().collect());
        set.doc_out_edges.insert(0, [1, 2].into_iter().collect());
        set.doc_out_edges.insert(1, [2].into_iter().collect());

        let ranks = set.compute_page_rank();
        assert!((ranks[0] - 1.0).abs() < 1e-9); // no in-edges, keeps initial value
        assert!((ranks[1] - (0.15 + 0.85 * 0.5)).abs() < 1e-9);
        assert!((ranks[2] - (0.15 + 0.85 * 1.5)).abs() < 1e-9);
    }

    #[test]
    fn url_fragments_are_stripped() {
        assert_eq!(
            defrag_url("https://example.com/page#section").as_deref(),
            Some("https://example.com/page")
        );
        assert!(defrag_url("not a url").is_none());
    }

    #[test]
    fn relative_links_resolve_against_the_page() {
        let base = Url::parse("https://example.com/dir/page").unwrap();
        assert_eq!(
            resolve_link(&base, "other#frag").as_deref(),
            Some("https://example.com/dir/other")
        );
        assert_eq!(
            resolve_link(&base, "https://other.org/x").as_deref(),
            Some("https://other.org/x")
        );
    }
}

use crate::error::IndexError;
use crate::postings::PostingsList;
use crate::tiered::{TieredIndexSet, Zone};
use crate::tokenizer;
use crate::zone::ZoneIndex;
use crate::DocId;
use std::collections::{HashMap, HashSet};

/// Tier multipliers, in descending priority order. Search stops descending
/// as soon as enough results have accumulated.
const TIER_WEIGHTS: [(Zone, f64); 5] = [
    (Zone::Title, 8.0),
    (Zone::Anchor, 7.0),
    (Zone::Header, 5.0),
    (Zone::Bold, 4.0),
    (Zone::Limited, 1.0),
];

/// Queries whose terms all stay under this full-body document frequency can
/// afford the unbounded full-body index for pagination.
const PAGINATION_DF_CUTOFF: usize = 600;

/// Tiered query evaluator over an immutable, merged index set.
pub struct Scorer<'a> {
    tiered: &'a TieredIndexSet,
    returned_results: HashSet<DocId>,
    current_results: HashMap<DocId, f64>,
}

impl<'a> Scorer<'a> {
    pub fn new(tiered: &'a TieredIndexSet) -> Self {
        Self { tiered, returned_results: HashSet::new(), current_results: HashMap::new() }
    }

    /// Forget which docs earlier pages returned; call when a fresh query
    /// starts.
    pub fn new_search(&mut self) {
        self.returned_results.clear();
    }

    /// Evaluate the query tier by tier, merging each tier's score deltas
    /// into the running results and stopping once `k_results` docs have
    /// accumulated. Returns the top URLs sorted by score descending.
    pub fn sprint_search(&mut self, query: &str, k_results: usize) -> Result<Vec<String>, IndexError> {
        let scored_query = self.score_query(query);
        let query_terms = sorted_terms(&scored_query);
        self.current_results.clear();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        for (zone, tier_weight) in TIER_WEIGHTS {
            let deltas = self.search_zone(
                self.tiered.zone(zone),
                &query_terms,
                &scored_query,
                tier_weight,
                k_results,
            )?;
            for (doc_id, score) in deltas {
                *self.current_results.entry(doc_id).or_insert(0.0) += score;
            }
            self.returned_results.extend(self.current_results.keys().copied());
            if self.current_results.len() >= k_results {
                break;
            }
        }
        Ok(self.ranked_urls(k_results))
    }

    /// Later result pages: replay the query against the full-body index when
    /// every term is rare enough, else against the limited index.
    pub fn complete_search(&mut self, query: &str, k_results: usize) -> Result<Vec<String>, IndexError> {
        let scored_query = self.score_query(query);
        let query_terms = sorted_terms(&scored_query);
        self.current_results.clear();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let full = self.tiered.zone(Zone::Full);
        let zone = if query_terms
            .iter()
            .all(|term| full.document_frequency(term).unwrap_or(0) < PAGINATION_DF_CUTOFF)
        {
            full
        } else {
            self.tiered.zone(Zone::Limited)
        };

        let deltas = self.search_zone(zone, &query_terms, &scored_query, 1.0, k_results)?;
        self.current_results.extend(deltas);
        self.returned_results.extend(self.current_results.keys().copied());
        Ok(self.ranked_urls(k_results))
    }

    /// Cosine-normalized query term weights against the full-body document
    /// frequencies. Terms unknown to the full-body index are dropped.
    fn score_query(&self, query: &str) -> HashMap<String, f64> {
        let full = self.tiered.zone(Zone::Full);
        let total_docs = self.tiered.doc_count() as f64;

        let mut weights: HashMap<String, f64> = HashMap::new();
        for (term, count) in tokenizer::tokenize_query(query, self.tiered.max_n_gram()) {
            let Some(df) = full.document_frequency(&term) else { continue };
            let weight = (1.0 + f64::from(count).log10()) * (total_docs / df as f64).log10();
            weights.insert(term, weight);
        }

        let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return HashMap::new();
        }
        for weight in weights.values_mut() {
            *weight /= norm;
        }
        weights
    }

    /// Score one tier. Candidates are every doc holding any query term in
    /// this zone, visited by descending match count so the best-covered docs
    /// are scored before the per-tier cutoff of `k_results` distinct docs.
    fn search_zone(
        &self,
        zone: &ZoneIndex,
        query_terms: &[String],
        scored_query: &HashMap<String, f64>,
        tier_weight: f64,
        k_results: usize,
    ) -> Result<HashMap<DocId, f64>, IndexError> {
        let mut term_lists: HashMap<&str, PostingsList> = HashMap::new();
        for term in query_terms {
            if zone.contains(term) {
                if let Some(list) = zone.retrieve(term)? {
                    term_lists.insert(term.as_str(), list);
                }
            }
        }

        let mut match_counts: HashMap<DocId, usize> = HashMap::new();
        for list in term_lists.values() {
            for doc_id in list.doc_ids() {
                *match_counts.entry(doc_id).or_insert(0) += 1;
            }
        }
        let mut candidates: Vec<(DocId, usize)> = match_counts.into_iter().collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let weights = zone.config().sort_weights;
        let mut results: HashMap<DocId, f64> = HashMap::new();
        let mut term_scores = vec![0.0f64; query_terms.len()];

        for (doc_id, _) in candidates {
            if results.len() >= k_results {
                break;
            }
            for (i, term) in query_terms.iter().enumerate() {
                term_scores[i] = match term_lists.get(term.as_str()).and_then(|list| list.get(doc_id)) {
                    Some(posting) => {
                        scored_query[term.as_str()]
                            * (weights.global_tf_idf * posting.global_tf_idf
                                + weights.local_tf_idf * posting.local_tf_idf
                                + weights.page_rank * posting.page_rank)
                    }
                    None => 0.0,
                };
            }
            let norm = term_scores.iter().map(|s| s * s).sum::<f64>().sqrt();
            let doc_score = if norm > 0.0 {
                tier_weight * term_scores.iter().sum::<f64>() / norm
            } else {
                0.0
            };
            results.insert(doc_id, doc_score);
        }
        Ok(results)
    }

    /// Current results as URLs, best score first, doc id breaking ties.
    fn ranked_urls(&self, k_results: usize) -> Vec<String> {
        let mut ranked: Vec<(DocId, f64)> =
            self.current_results.iter().map(|(&doc_id, &score)| (doc_id, score)).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });
        ranked
            .into_iter()
            .take(k_results)
            .filter_map(|(doc_id, _)| self.tiered.doc_url(doc_id).map(str::to_string))
            .collect()
    }
}

/// Deterministic query-term order for the score vector.
fn sorted_terms(scored_query: &HashMap<String, f64>) -> Vec<String> {
    let mut terms: Vec<String> = scored_query.keys().cloned().collect();
    terms.sort_unstable();
    terms
}

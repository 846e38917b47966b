use crate::error::IndexError;
use crate::{DocId, Position};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Separates postings (and the leading total term frequency) within a line.
pub(crate) const LIST_DELIM: char = ',';
/// Separates fields within one serialized posting.
pub(crate) const POSTING_DELIM: char = ':';

/// One (term, doc) record. Scores start at -1.0 and only become meaningful
/// once the merge phase has run; they are >= 0 afterwards.
#[derive(Debug, Clone)]
pub struct Posting {
    pub doc_id: DocId,
    pub doc_term_frequency: u32,
    pub local_tf_idf: f64,
    pub global_tf_idf: f64,
    pub page_rank: f64,
    pub positions: Option<Vec<Position>>,
}

impl Posting {
    fn new(doc_id: DocId, doc_term_frequency: u32, positions: Option<Vec<Position>>) -> Self {
        Self {
            doc_id,
            doc_term_frequency,
            local_tf_idf: -1.0,
            global_tf_idf: -1.0,
            page_rank: -1.0,
            positions,
        }
    }

    fn parse(data: &str) -> Result<Self, IndexError> {
        let fields: Vec<&str> = data.split(POSTING_DELIM).collect();
        if fields.len() < 5 {
            return Err(IndexError::IndexCorrupt(format!(
                "posting {data:?} has {} of 5 required fields",
                fields.len()
            )));
        }
        let positions = if fields.len() > 5 {
            Some(fields[5..].iter().map(|f| parse_field(f)).collect::<Result<Vec<_>, _>>()?)
        } else {
            None
        };
        Ok(Self {
            doc_id: parse_field(fields[0])?,
            doc_term_frequency: parse_field(fields[1])?,
            local_tf_idf: parse_field(fields[2])?,
            global_tf_idf: parse_field(fields[3])?,
            page_rank: parse_field(fields[4])?,
            positions,
        })
    }

    fn dump(&self, out: &mut String) {
        let d = POSTING_DELIM;
        let _ = write!(
            out,
            "{}{d}{}{d}{:.3}{d}{:.3}{d}{:.3}",
            self.doc_id, self.doc_term_frequency, self.local_tf_idf, self.global_tf_idf, self.page_rank
        );
        if let Some(positions) = &self.positions {
            for position in positions {
                let _ = write!(out, "{d}{position}");
            }
        }
    }
}

fn parse_field<T: std::str::FromStr>(field: &str) -> Result<T, IndexError> {
    field
        .parse()
        .map_err(|_| IndexError::IndexCorrupt(format!("unparsable posting field {field:?}")))
}

/// All postings for one term in one zone, with the cached total term
/// frequency and a doc id lookup. Mutable until the merge writes it out.
#[derive(Debug)]
pub struct PostingsList {
    store_positions: bool,
    total_term_frequency: u64,
    postings: Vec<Posting>,
    by_doc: HashMap<DocId, usize>,
}

impl PostingsList {
    pub fn new(store_positions: bool) -> Self {
        Self {
            store_positions,
            total_term_frequency: 0,
            postings: Vec::new(),
            by_doc: HashMap::new(),
        }
    }

    /// Parse one serialized list from a final index line body.
    pub fn from_line(store_positions: bool, body: &str) -> Result<Self, IndexError> {
        let mut parts = body.split(LIST_DELIM);
        let total = parts
            .next()
            .ok_or_else(|| IndexError::IndexCorrupt("empty postings line".into()))?;
        let total_term_frequency = parse_field(total)?;
        let postings = parts.map(Posting::parse).collect::<Result<Vec<_>, _>>()?;
        let by_doc = index_by_doc(&postings);
        Ok(Self { store_positions, total_term_frequency, postings, by_doc })
    }

    /// Concatenate raw posting fragments read from partial index files.
    /// Partials are filled sequentially, so doc ids never repeat across
    /// fragments and the order is already by ascending doc id.
    pub fn from_fragments(store_positions: bool, fragments: &[String]) -> Result<Self, IndexError> {
        let mut postings = Vec::new();
        for fragment in fragments {
            for data in fragment.split(LIST_DELIM) {
                postings.push(Posting::parse(data)?);
            }
        }
        let total_term_frequency = postings.iter().map(|p| u64::from(p.doc_term_frequency)).sum();
        let by_doc = index_by_doc(&postings);
        Ok(Self { store_positions, total_term_frequency, postings, by_doc })
    }

    /// Append a posting for `doc_id` whose term frequency is the number of
    /// positions given. Positions themselves are kept only when this zone
    /// stores them.
    pub fn create_posting(&mut self, doc_id: DocId, positions: &[Position]) {
        let stored = self.store_positions.then(|| positions.to_vec());
        self.push(Posting::new(doc_id, positions.len() as u32, stored));
    }

    /// Append a posting that carries only an occurrence count (anchor text
    /// stores no real positions).
    pub fn create_counted_posting(&mut self, doc_id: DocId, count: u32) {
        self.push(Posting::new(doc_id, count, None));
    }

    fn push(&mut self, posting: Posting) {
        self.total_term_frequency += u64::from(posting.doc_term_frequency);
        self.by_doc.insert(posting.doc_id, self.postings.len());
        self.postings.push(posting);
    }

    /// TF-IDF against this zone's own document frequency. `total_docs` is
    /// corpus-wide. The full-body zone passes `copy_to_global` since it is
    /// its own reference.
    pub fn compute_local_tf_idf(&mut self, total_docs: usize, copy_to_global: bool) {
        if self.postings.is_empty() {
            return;
        }
        let idf = (total_docs as f64 / self.by_doc.len() as f64).log10();
        for posting in &mut self.postings {
            posting.local_tf_idf = (1.0 + f64::from(posting.doc_term_frequency).log10()) * idf;
            if copy_to_global {
                posting.global_tf_idf = posting.local_tf_idf;
            }
        }
    }

    /// Copy each posting's global TF-IDF from the full-body reference list.
    /// Every doc here must exist there; a miss means the merge order was
    /// violated.
    pub fn add_global_tf_idf(&mut self, reference: &PostingsList) -> Result<(), IndexError> {
        for posting in &mut self.postings {
            let Some(source) = reference.get(posting.doc_id) else {
                return Err(IndexError::MissingReferenceDoc(posting.doc_id));
            };
            posting.global_tf_idf = source.global_tf_idf;
        }
        Ok(())
    }

    pub fn set_page_rankings(&mut self, page_ranks: &[f64]) {
        for posting in &mut self.postings {
            posting.page_rank = page_ranks[posting.doc_id as usize];
        }
    }

    /// Stable descending sort by the weighted score combination.
    pub fn sort(&mut self, page_rank_weight: f64, global_tf_idf_weight: f64, local_tf_idf_weight: f64) {
        let key = |p: &Posting| {
            page_rank_weight * p.page_rank
                + global_tf_idf_weight * p.global_tf_idf
                + local_tf_idf_weight * p.local_tf_idf
        };
        self.postings
            .sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(std::cmp::Ordering::Equal));
        self.by_doc = index_by_doc(&self.postings);
    }

    /// Keep only the first `top_k` postings, rebuilding the cached total
    /// term frequency and the doc lookup.
    pub fn limit(&mut self, top_k: usize) {
        self.postings.truncate(top_k);
        self.total_term_frequency = self.postings.iter().map(|p| u64::from(p.doc_term_frequency)).sum();
        self.by_doc = index_by_doc(&self.postings);
    }

    /// Serialize the whole list for the final index file.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}", self.total_term_frequency);
        for posting in &self.postings {
            out.push(LIST_DELIM);
            posting.dump(&mut out);
        }
        out
    }

    /// Serialize only the raw postings for a partial index file.
    pub fn dump_raw(&self) -> String {
        let mut out = String::new();
        for (i, posting) in self.postings.iter().enumerate() {
            if i > 0 {
                out.push(LIST_DELIM);
            }
            posting.dump(&mut out);
        }
        out
    }

    pub fn get(&self, doc_id: DocId) -> Option<&Posting> {
        self.by_doc.get(&doc_id).map(|&i| &self.postings[i])
    }

    pub fn contains_doc(&self, doc_id: DocId) -> bool {
        self.by_doc.contains_key(&doc_id)
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.postings.iter().map(|p| p.doc_id)
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn total_term_frequency(&self) -> u64 {
        self.total_term_frequency
    }

    pub fn len(&self) -> usize {
        self.by_doc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_doc.is_empty()
    }
}

fn index_by_doc(postings: &[Posting]) -> HashMap<DocId, usize> {
    postings.iter().enumerate().map(|(i, p)| (p.doc_id, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored_list() -> PostingsList {
        let mut list = PostingsList::new(true);
        list.create_posting(0, &[1, 4, 9]);
        list.create_posting(1, &[2]);
        list.create_posting(2, &[3, 7]);
        list.compute_local_tf_idf(100, true);
        list.set_page_rankings(&[1.0, 0.5, 2.0]);
        list
    }

    #[test]
    fn dump_and_parse_round_trip() {
        let list = scored_list();
        let dumped = list.dump();
        let parsed = PostingsList::from_line(true, &dumped).unwrap();
        assert_eq!(parsed.dump(), dumped);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.total_term_frequency(), 6);
        assert_eq!(parsed.get(0).unwrap().positions.as_deref(), Some(&[1, 4, 9][..]));
    }

    #[test]
    fn raw_fragments_merge_into_one_list() {
        let mut a = PostingsList::new(false);
        a.create_posting(0, &[1]);
        a.create_posting(1, &[5, 6]);
        let mut b = PostingsList::new(false);
        b.create_posting(2, &[9]);

        let merged = PostingsList::from_fragments(false, &[a.dump_raw(), b.dump_raw()]).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.total_term_frequency(), 4);
        assert_eq!(merged.get(1).unwrap().doc_term_frequency, 2);
    }

    #[test]
    fn local_tf_idf_uses_zone_df() {
        let mut list = PostingsList::new(false);
        list.create_posting(7, &[0; 10]);
        list.compute_local_tf_idf(100, false);
        // (1 + log10(10)) * log10(100 / 1) = 2 * 2
        let posting = list.get(7).unwrap();
        assert!((posting.local_tf_idf - 4.0).abs() < 1e-9);
        assert!((posting.global_tf_idf + 1.0).abs() < 1e-9);

        let mut copied = PostingsList::new(false);
        copied.create_posting(7, &[0; 10]);
        copied.compute_local_tf_idf(100, true);
        assert!((copied.get(7).unwrap().global_tf_idf - 4.0).abs() < 1e-9);
    }

    #[test]
    fn global_tf_idf_requires_reference_doc() {
        let mut reference = PostingsList::new(false);
        reference.create_posting(0, &[1]);
        reference.compute_local_tf_idf(10, true);

        let mut list = PostingsList::new(false);
        list.create_posting(0, &[1]);
        list.create_posting(3, &[1]);
        list.compute_local_tf_idf(10, false);

        match list.add_global_tf_idf(&reference) {
            Err(IndexError::MissingReferenceDoc(3)) => {}
            other => panic!("expected MissingReferenceDoc(3), got {other:?}"),
        }
    }

    #[test]
    fn sort_orders_by_weighted_score_descending() {
        let mut list = scored_list();
        // page rank dominates: doc 2 (2.0) > doc 0 (1.0) > doc 1 (0.5)
        list.sort(1.0, 0.0, 0.0);
        let order: Vec<DocId> = list.doc_ids().collect();
        assert_eq!(order, vec![2, 0, 1]);
        // lookup survives the reorder
        assert_eq!(list.get(1).unwrap().doc_id, 1);
    }

    #[test]
    fn limit_rebuilds_totals_and_lookup() {
        let mut list = scored_list();
        list.sort(1.0, 0.0, 0.0);
        list.limit(2);
        assert_eq!(list.len(), 2);
        assert_eq!(list.total_term_frequency(), 5); // docs 2 and 0
        assert!(list.get(1).is_none());
        assert!(list.contains_doc(2));
    }

    #[test]
    fn malformed_posting_is_corrupt() {
        assert!(PostingsList::from_line(false, "1,0:x:0.0:0.0:0.0").is_err());
        assert!(PostingsList::from_line(false, "nonsense").is_err());
    }
}

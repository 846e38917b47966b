use crate::Position;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use scraper::{Html, Selector};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TOKEN_RE: Regex =
        Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Stemmed n-gram term mapped to its positions in one zone's token stream.
pub type TermPositions = HashMap<String, Vec<Position>>;
/// Stemmed n-gram term mapped to its occurrence count.
pub type TermCounts = HashMap<String, u32>;

/// Per-zone term/position maps for one parsed document.
pub struct ZoneTokens {
    pub title: TermPositions,
    pub header: TermPositions,
    pub bold: TermPositions,
    pub text: TermPositions,
}

/// Tokenize an HTML document into per-zone term/position maps. The corpus
/// stores content as an already-decoded string, so `encoding` is advisory.
pub fn tokenize_html(content: &str, _encoding: &str, max_n_gram: usize) -> ZoneTokens {
    let sel_title = Selector::parse("title").expect("valid selector");
    let sel_header = Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid selector");
    let sel_bold = Selector::parse("b, strong, em, i").expect("valid selector");

    let doc = Html::parse_document(content);
    let body_tokens = stem_tokens(&document_text(&doc));
    ZoneTokens {
        title: zone_terms(&doc, &sel_title, max_n_gram),
        header: zone_terms(&doc, &sel_header, max_n_gram),
        bold: zone_terms(&doc, &sel_bold, max_n_gram),
        text: ngram_positions(&body_tokens, max_n_gram),
    }
}

/// Extract each outbound link's raw href mapped to the n-gram counts of its
/// anchor text. Links whose anchor text yields no terms still get an entry,
/// so the link graph sees every edge.
pub fn get_page_links(content: &str, max_n_gram: usize) -> HashMap<String, TermCounts> {
    let sel_anchor = Selector::parse("a").expect("valid selector");

    let doc = Html::parse_document(content);
    let mut links: HashMap<String, TermCounts> = HashMap::new();
    for anchor in doc.select(&sel_anchor) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let text = anchor.text().collect::<Vec<_>>().join(" ");
        let counts = links.entry(href.to_string()).or_default();
        for (term, count) in ngram_counts(&stem_tokens(&text), max_n_gram) {
            *counts.entry(term).or_insert(0) += count;
        }
    }
    links
}

/// 32-bit SimHash over the document's stemmed unigrams weighted by frequency.
pub fn get_doc_simhash(content: &str) -> u32 {
    let doc = Html::parse_document(content);
    let mut weights: HashMap<String, i64> = HashMap::new();
    for token in stem_tokens(&document_text(&doc)) {
        *weights.entry(token).or_insert(0) += 1;
    }

    let mut acc = [0i64; 32];
    for (term, weight) in &weights {
        let hash = crc32fast::hash(term.as_bytes());
        for (bit, slot) in acc.iter_mut().enumerate() {
            if hash >> bit & 1 == 1 {
                *slot += weight;
            } else {
                *slot -= weight;
            }
        }
    }

    let mut simhash = 0u32;
    for (bit, slot) in acc.iter().enumerate() {
        if *slot > 0 {
            simhash |= 1 << bit;
        }
    }
    simhash
}

/// Tokenize a query string into n-gram term counts.
pub fn tokenize_query(query: &str, max_n_gram: usize) -> TermCounts {
    ngram_counts(&stem_tokens(query), max_n_gram)
}

/// NFKC-normalize, lowercase, split on the token pattern, and stem.
fn stem_tokens(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    TOKEN_RE
        .find_iter(&normalized)
        .map(|token| STEMMER.stem(token.as_str()).to_string())
        .collect()
}

fn zone_terms(doc: &Html, selector: &Selector, max_n_gram: usize) -> TermPositions {
    let mut tokens = Vec::new();
    for element in doc.select(selector) {
        let text = element.text().collect::<Vec<_>>().join(" ");
        tokens.extend(stem_tokens(&text));
    }
    ngram_positions(&tokens, max_n_gram)
}

fn document_text(doc: &Html) -> String {
    doc.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Every whitespace-joined run of 1..=max_n_gram consecutive tokens, keyed to
/// the position of its first token. Positions come out sorted ascending.
fn ngram_positions(tokens: &[String], max_n_gram: usize) -> TermPositions {
    let mut terms: TermPositions = HashMap::new();
    for start in 0..tokens.len() {
        let mut term = String::new();
        for len in 1..=max_n_gram {
            let Some(token) = tokens.get(start + len - 1) else { break };
            if len > 1 {
                term.push(' ');
            }
            term.push_str(token);
            terms.entry(term.clone()).or_default().push(start as Position);
        }
    }
    terms
}

fn ngram_counts(tokens: &[String], max_n_gram: usize) -> TermCounts {
    let mut counts: TermCounts = HashMap::new();
    for (term, positions) in ngram_positions(tokens, max_n_gram) {
        counts.insert(term, positions.len() as u32);
    }
    counts
}

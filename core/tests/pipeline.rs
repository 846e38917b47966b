use serde_json::json;
use shoal_core::persist::IndexPaths;
use shoal_core::scorer::Scorer;
use shoal_core::tiered::{TieredIndexSet, Zone, DEFAULT_PAGE_RANK_ITERATIONS};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const URL_A: &str = "https://toy.example/a";
const URL_B: &str = "https://toy.example/b";
const URL_C: &str = "https://toy.example/c";

/// Doc a ("foo") links to b with anchor text "bar foo" and to c without
/// text; doc b ("bar foo") links to c; doc c ("baz") links nowhere.
fn page_a() -> String {
    concat!(
        "<html><head><title>foo</title></head><body><p>foo</p>",
        "<a href=\"https://toy.example/b\">bar foo</a>",
        "<a href=\"https://toy.example/c\"></a>",
        "</body></html>",
    )
    .to_string()
}

fn page_b() -> String {
    concat!(
        "<html><head><title>bar foo</title></head><body><p>bar foo</p>",
        "<a href=\"https://toy.example/c\"></a>",
        "</body></html>",
    )
    .to_string()
}

fn page_c() -> String {
    "<html><head><title>baz</title></head><body><p>baz</p></body></html>".to_string()
}

fn write_doc(corpus: &Path, file_name: &str, url: &str, content: &str) {
    let doc = json!({ "url": url, "content": content, "encoding": "utf-8" });
    fs::write(corpus.join(file_name), doc.to_string()).unwrap();
}

fn write_toy_corpus(corpus: &Path) {
    fs::create_dir_all(corpus).unwrap();
    write_doc(corpus, "a.json", URL_A, &page_a());
    write_doc(corpus, "b.json", URL_B, &page_b());
    write_doc(corpus, "c.json", URL_C, &page_c());
}

fn build(dir: &TempDir) -> TieredIndexSet {
    let corpus = dir.path().join("corpus");
    write_toy_corpus(&corpus);
    build_from(dir, &corpus)
}

fn build_from(dir: &TempDir, corpus: &Path) -> TieredIndexSet {
    let paths = IndexPaths::new(dir.path().join("index"));
    paths.create_dirs().unwrap();
    let mut tiered = TieredIndexSet::new(paths, 3, DEFAULT_PAGE_RANK_ITERATIONS).unwrap();
    tiered.build_tiered_indexes(corpus).unwrap();
    tiered
}

#[test]
fn title_matches_rank_by_tier_scores() {
    let dir = TempDir::new().unwrap();
    let tiered = build(&dir);
    assert_eq!(tiered.doc_count(), 3);

    let mut scorer = Scorer::new(&tiered);
    // doc b collects the anchor tier on top of title and limited
    assert_eq!(scorer.sprint_search("foo", 10).unwrap(), vec![URL_B, URL_A]);

    scorer.new_search();
    assert_eq!(scorer.sprint_search("baz", 10).unwrap(), vec![URL_C]);

    scorer.new_search();
    assert!(scorer.sprint_search("qux", 10).unwrap().is_empty());
}

#[test]
fn repeated_searches_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let tiered = build(&dir);
    let mut scorer = Scorer::new(&tiered);

    let first = scorer.sprint_search("foo", 10).unwrap();
    scorer.new_search();
    let second = scorer.sprint_search("foo", 10).unwrap();
    assert_eq!(first, second);
}

#[test]
fn pagination_replays_the_low_tier() {
    let dir = TempDir::new().unwrap();
    let tiered = build(&dir);
    let mut scorer = Scorer::new(&tiered);

    let first_page: Vec<String> = scorer.sprint_search("foo", 10).unwrap();
    let next_page = scorer.complete_search("foo", 10).unwrap();
    // the low tier sees the same docs again
    let mut first_sorted = first_page.clone();
    first_sorted.sort();
    let mut next_sorted = next_page.clone();
    next_sorted.sort();
    assert_eq!(first_sorted, next_sorted);
}

#[test]
fn exact_duplicate_content_is_dropped() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    write_toy_corpus(&corpus);
    // byte-identical to doc b under a fresh url
    write_doc(&corpus, "d.json", "https://toy.example/d", &page_b());

    let tiered = build_from(&dir, &corpus);
    assert_eq!(tiered.doc_count(), 3);

    let mut scorer = Scorer::new(&tiered);
    assert_eq!(scorer.sprint_search("foo", 10).unwrap(), vec![URL_B, URL_A]);
}

#[test]
fn near_duplicate_content_is_dropped() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    write_toy_corpus(&corpus);
    // same term multiset as doc b (so an identical SimHash) but different
    // bytes, so the exact-hash check does not catch it
    let remixed = concat!(
        "<html><head><title>bar foo</title></head><body><div>bar  foo</div>",
        "<a href=\"https://toy.example/c\"></a>",
        "</body></html>",
    );
    write_doc(&corpus, "e.json", "https://toy.example/e", remixed);

    let tiered = build_from(&dir, &corpus);
    assert_eq!(tiered.doc_count(), 3);

    let mut scorer = Scorer::new(&tiered);
    assert_eq!(scorer.sprint_search("foo", 10).unwrap(), vec![URL_B, URL_A]);
}

#[test]
fn malformed_corpus_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    write_toy_corpus(&corpus);
    fs::write(corpus.join("bad.json"), "{\"url\": \"https://toy.example/bad\"}").unwrap();
    fs::write(corpus.join("junk.json"), "not json at all").unwrap();
    fs::write(corpus.join("notes.txt"), "ignored entirely").unwrap();

    let tiered = build_from(&dir, &corpus);
    assert_eq!(tiered.doc_count(), 3);
}

#[test]
fn global_tf_idf_joins_the_full_body_index() {
    let dir = TempDir::new().unwrap();
    let tiered = build(&dir);

    let title = tiered.zone(Zone::Title).retrieve("foo").unwrap().unwrap();
    let full = tiered.zone(Zone::Full).retrieve("foo").unwrap().unwrap();
    assert_eq!(title.len(), tiered.zone(Zone::Title).document_frequency("foo").unwrap());
    for posting in title.postings() {
        let reference = full.get(posting.doc_id).unwrap();
        assert!((posting.global_tf_idf - reference.global_tf_idf).abs() < 1e-9);
        assert!(posting.local_tf_idf >= 0.0);
        assert!(posting.page_rank >= 0.0);
    }
}

#[test]
fn anchor_zone_holds_aggregated_counts_for_link_targets() {
    let dir = TempDir::new().unwrap();
    let tiered = build(&dir);
    let anchor = tiered.zone(Zone::Anchor);

    // only doc b is linked to with anchor text
    for term in ["bar", "foo", "bar foo"] {
        let list = anchor.retrieve(term).unwrap().unwrap();
        assert_eq!(list.len(), 1);
        let posting = list.get(1).unwrap();
        assert_eq!(posting.doc_term_frequency, 1);
        assert!(posting.positions.is_none());
    }
    assert!(!anchor.contains("baz"));
}

#[test]
fn page_rank_flows_into_merged_postings() {
    let dir = TempDir::new().unwrap();
    let tiered = build(&dir);

    // in(c) = {a, b}: 0.15 + 0.85 * (1/2 + 1/1)
    let baz = tiered.zone(Zone::Title).retrieve("baz").unwrap().unwrap();
    assert!((baz.get(2).unwrap().page_rank - 1.425).abs() < 1e-9);
    // in(b) = {a}: 0.15 + 0.85 * 1/2
    let title_foo = tiered.zone(Zone::Title).retrieve("foo").unwrap().unwrap();
    assert!((title_foo.get(1).unwrap().page_rank - 0.575).abs() < 1e-9);
    // a has no in-edges and keeps the initial value
    assert!((title_foo.get(0).unwrap().page_rank - 1.0).abs() < 1e-9);
}

#[test]
fn settings_snapshot_reloads_into_a_readable_index() {
    let dir = TempDir::new().unwrap();
    let tiered = build(&dir);
    let mut scorer = Scorer::new(&tiered);
    let built = scorer.sprint_search("foo", 10).unwrap();
    drop(scorer);
    drop(tiered);

    let reopened =
        TieredIndexSet::new(IndexPaths::new(dir.path().join("index")), 3, DEFAULT_PAGE_RANK_ITERATIONS)
            .unwrap();
    assert_eq!(reopened.doc_count(), 3);
    let mut scorer = Scorer::new(&reopened);
    assert_eq!(scorer.sprint_search("foo", 10).unwrap(), built);
}

use rstest::rstest;
use std::collections::HashSet;
use std::sync::Arc;
use zimr_archive::{ArchiveId, MockArchive, MockDecoder};
use zimr_config::Config;
use zimr_content::OutputOptions;
use zimr_library::error::ErrorKind;
use zimr_library::{Library, RandomSelection};

/// Twenty articles, plus the kinds of entry that must never be picked.
fn dense(id: &str) -> MockArchive {
    (0..20)
        .fold(MockArchive::new(id, id), |archive, i| {
            archive.with_titled_entry(format!("A/Article{i}"), format!("Article {i}"), "text/html", format!("<p>Article {i}</p>"))
        })
        .with_redirect("A/Alias", "A/Article0")
        .with_entry("M/Title", "text/plain", "metadata")
        .with_entry("X/fulltext/xapian", "application/octet-stream+xapian", vec![0u8; 16])
}

/// Nothing but redirects and metadata.
fn barren() -> MockArchive {
    MockArchive::new("barren.zim", "Barren")
        .with_redirect("A/One", "A/Two")
        .with_redirect("A/Two", "A/One")
        .with_entry("M/Title", "text/plain", "Barren")
}

fn library(archives: impl IntoIterator<Item = MockArchive>) -> Library {
    let decoder = Arc::new(MockDecoder::with_archives(archives));
    Library::new(Config::default(), decoder.clone(), decoder)
}

fn ids(names: &[&str]) -> Vec<ArchiveId> {
    names.iter().map(|name| ArchiveId::new(*name)).collect()
}

fn assert_valid(selection: &RandomSelection) {
    let mut seen = HashSet::new();
    for entry in &selection.entries {
        assert!(entry.path.starts_with("A/Article"), "picked {}", entry.path);
        assert!(seen.insert((entry.archive_id.clone(), entry.path.clone())), "picked {} twice", entry.path);
    }
}

#[tokio::test]
async fn draws_only_content_entries() {
    let library = library([dense("a.zim")]);
    for _ in 0..10 {
        let selection = library.random_entries(ids(&["a.zim"]), 5, None).await.unwrap();
        assert_eq!(selection.entries.len(), 5);
        assert!(selection.failures.is_empty());
        assert_valid(&selection);
    }
}

#[tokio::test]
async fn spreads_draws_round_robin() {
    let library = library([dense("a.zim"), dense("b.zim")]);
    let selection = library.random_entries(ids(&["a.zim", "b.zim", "a.zim"]), 5, None).await.unwrap();
    let from = |id: &str| selection.entries.iter().filter(|e| e.archive_id.as_str() == id).count();
    assert_eq!((from("a.zim"), from("b.zim")), (3, 2));
    assert_valid(&selection);
}

#[tokio::test]
async fn defaults_to_a_subset_of_all_archives() {
    let library = library([dense("a.zim"), dense("b.zim"), dense("c.zim")]);
    let selection = library.random_entries(Vec::new(), 2, None).await.unwrap();
    assert_eq!(selection.entries.len(), 2);
    let archives: HashSet<_> = selection.entries.iter().map(|e| e.archive_id.clone()).collect();
    assert_eq!(archives.len(), 2);
}

#[tokio::test]
async fn processes_content_on_request() {
    let library = library([dense("a.zim")]);
    let options = OutputOptions {
        raw_output: false,
        markdown_only: true,
    };
    let selection = library.random_entries(ids(&["a.zim"]), 3, Some(options)).await.unwrap();
    for entry in &selection.entries {
        let text = entry.content.as_ref().and_then(|c| c.text()).unwrap();
        assert!(text.contains("Article"));
    }
}

#[tokio::test]
async fn barren_archive_is_reported_not_fatal() {
    let library = library([dense("a.zim"), barren()]);
    let selection = library.random_entries(ids(&["a.zim", "barren.zim"]), 4, None).await.unwrap();
    assert_eq!(selection.entries.len(), 2);
    assert!(selection.entries.iter().all(|e| e.archive_id.as_str() == "a.zim"));
    assert_eq!(selection.failures.len(), 1);
    assert_eq!(selection.failures[0].archive_id, ArchiveId::new("barren.zim"));
}

#[tokio::test]
async fn missing_archive_is_reported_not_fatal() {
    let library = library([dense("a.zim")]);
    let selection = library.random_entries(ids(&["a.zim", "gone.zim"]), 2, None).await.unwrap();
    assert_eq!(selection.entries.len(), 1);
    assert_eq!(selection.failures[0].archive_id, ArchiveId::new("gone.zim"));
}

#[tokio::test]
async fn nothing_resolvable_fails() {
    let library = library([dense("a.zim")]);
    let err = library.random_entries(ids(&["gone.zim"]), 2, None).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::NoResolvableArchives(failures) if failures.len() == 1));
}

#[rstest]
#[case(0)]
#[case(51)]
#[tokio::test]
async fn count_is_bounded(#[case] count: usize) {
    let library = library([dense("a.zim")]);
    let err = library.random_entries(Vec::new(), count, None).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::InvalidRequest(_)));
}

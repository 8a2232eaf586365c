// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use extractrs::domain::services::extraction_service::ExtractionService;
use url::Url;

fn page_html(body: &str) -> String {
    format!(
        "<html><head><title>T</title></head><body><article>{}</article></body></html>",
        body
    )
}

/// 同一(html, url)输入必须产生字节级一致的输出
#[test]
fn test_extraction_is_byte_deterministic() {
    let url = Url::parse("https://example.com/post").unwrap();
    let html = page_html(
        "<h1>Title</h1><p>Body with a <a href=\"/x\">link</a> and <a href=\"https://other.io/y\">another</a>.\
         Plenty of additional words so the scorer has something to chew on, with commas, periods.</p>\
         <ul><li>one</li><li>two</li></ul>",
    );

    let runs: Vec<_> = (0..5)
        .map(|_| ExtractionService::extract(&html, &url))
        .collect();

    for pair in runs.windows(2) {
        assert_eq!(pair[0].markdown, pair[1].markdown);
        assert_eq!(pair[0].links.internal, pair[1].links.internal);
        assert_eq!(pair[0].links.external, pair[1].links.external);
        assert_eq!(pair[0].metadata.word_count, pair[1].metadata.word_count);
    }
}

#[test]
fn test_word_count_matches_read_time_contract() {
    let url = Url::parse("https://example.com/").unwrap();
    let words = "lorem ipsum dolor sit amet ".repeat(100);
    let html = page_html(&format!("<p>{}</p>", words));
    let extracted = ExtractionService::extract(&html, &url);

    let wc = extracted.metadata.word_count;
    assert!(wc >= 450, "expected most of the 500 words, got {}", wc);
    assert_eq!(extracted.metadata.read_time_minutes, (wc + 199) / 200);
}

#[test]
fn test_links_partition_and_never_overlap() {
    let url = Url::parse("https://docs.example.com/a").unwrap();
    let html = page_html(
        "<p>Enough prose to anchor the scorer on this subtree, with punctuation, and even more \
         filler text to be safe.</p>\
         <a href=\"/b\">b</a>\
         <a href=\"https://example.com/c\">c</a>\
         <a href=\"https://rust-lang.org/d\">d</a>",
    );
    let extracted = ExtractionService::extract(&html, &url);

    // docs.example.com 与 example.com 同可注册域
    assert!(extracted
        .links
        .internal
        .contains(&"https://docs.example.com/b".to_string()));
    assert!(extracted
        .links
        .internal
        .contains(&"https://example.com/c".to_string()));
    assert!(extracted
        .links
        .external
        .contains(&"https://rust-lang.org/d".to_string()));

    for link in &extracted.links.internal {
        assert!(!extracted.links.external.contains(link));
    }
}

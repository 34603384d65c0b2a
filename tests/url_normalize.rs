use news_collector::url_normalize::{extract_domain, is_same_domain, is_valid_url, normalize, NormalizeOptions};

#[test]
fn strips_tracking_params_and_fragment() {
    let opts = NormalizeOptions::default();
    let a = normalize(
        "https://example.com/a/article?utm_source=feed&utm_medium=rss&id=5#top",
        &opts,
    )
    .unwrap();
    let b = normalize("https://example.com/a/article?id=5", &opts).unwrap();
    assert_eq!(a, b);
}

#[test]
fn http_and_https_with_and_without_www_collapse_to_one_form() {
    let opts = NormalizeOptions::default();
    let variants = [
        "http://www.example.com/story",
        "https://example.com/story",
        "https://www.example.com/story/",
    ];
    let normalized: Vec<_> = variants.iter().map(|u| normalize(u, &opts).unwrap()).collect();
    assert!(normalized.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn custom_remove_params_extend_the_default_set() {
    let mut opts = NormalizeOptions::default();
    opts.remove_params.insert("icid".to_string());
    let a = normalize("https://example.com/post?icid=homepage&id=9", &opts).unwrap();
    let b = normalize("https://example.com/post?id=9", &opts).unwrap();
    assert_eq!(a, b);
}

#[test]
fn same_domain_ignores_www_and_scheme() {
    assert!(is_same_domain(
        "https://www.techcrunch.com/a",
        "http://techcrunch.com/b"
    ));
    assert!(!is_same_domain("https://techcrunch.com/a", "https://theverge.com/b"));
}

#[test]
fn extract_domain_and_validity() {
    assert_eq!(
        extract_domain("https://sub.example.com/path").as_deref(),
        Some("sub.example.com")
    );
    assert!(is_valid_url("https://example.com"));
    assert!(!is_valid_url("not a url"));
}

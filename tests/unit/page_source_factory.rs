use activity_harvester::fetcher::create_page_source;
use activity_harvester::fetcher::http::HttpPageSource;
use activity_harvester::Platform;
use std::time::Duration;

#[test]
fn test_page_source_factory_github_default_host() {
    let source = HttpPageSource::new(Platform::GitHub).unwrap();
    assert!(source.base_url().contains("api.github.com"));
}

#[test]
fn test_page_source_factory_stack_exchange_default_host() {
    let source = HttpPageSource::new(Platform::StackExchange).unwrap();
    assert!(source.base_url().contains("api.stackexchange.com"));
}

#[test]
fn test_page_source_factory_jira_requires_base_url() {
    assert!(create_page_source(Platform::Jira, None, Duration::from_secs(10)).is_err());
    assert!(create_page_source(
        Platform::Jira,
        Some("https://example.atlassian.net/"),
        Duration::from_secs(10)
    )
    .is_ok());
}

#[test]
fn test_page_source_factory_trims_trailing_slash() {
    let source =
        HttpPageSource::with_base_url(Platform::Jira, "https://example.atlassian.net/").unwrap();
    assert_eq!(source.base_url(), "https://example.atlassian.net");
}

#[test]
fn test_page_source_factory_rejects_non_http_scheme() {
    assert!(HttpPageSource::with_base_url(Platform::GitHub, "ftp://example.com").is_err());
}

use chrono::{DateTime, Duration, TimeZone, Utc};
use pr_harvester::dataset::{CsvSink, DatasetSink, COLUMNS};
use pr_harvester::discovery::{self, DiscoverySettings};
use pr_harvester::types::{load_repositories, save_repositories};
use pr_harvester::{AppConfig, Collector, RepositoryDescriptor};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::with_token("test-token");
    config.github_api_base = server.uri();
    config.page_delay_ms = 0;
    config.repository_delay_ms = 0;
    config.rate_limit_cooldown_secs = 0;
    config
}

fn created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
}

fn pull(number: u64, open_for: Duration, merged: bool) -> Value {
    let closed = created() + open_for;
    let merged_at = merged.then(|| closed.to_rfc3339());
    json!({
        "id": 5000 + number,
        "number": number,
        "state": "closed",
        "title": format!("Change {}", number),
        "body": "Some description",
        "user": { "login": "author" },
        "created_at": created().to_rfc3339(),
        "closed_at": closed.to_rfc3339(),
        "merged_at": merged_at
    })
}

async fn respond(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts the three pull requests of the reference scenario:
/// #1 reviewed and open for two hours, #2 reviewed but closed after 30 minutes,
/// #3 open for five hours without any review.
async fn mount_reference_repository(server: &MockServer) {
    respond(
        server,
        "/repos/acme/widgets/pulls/1/reviews",
        json!([{ "id": 1, "user": { "login": "reviewer" }, "state": "APPROVED" }]),
    )
    .await;
    respond(
        server,
        "/repos/acme/widgets/pulls/2/reviews",
        json!([{ "id": 2, "user": { "login": "reviewer" }, "state": "APPROVED" }]),
    )
    .await;
    respond(server, "/repos/acme/widgets/pulls/3/reviews", json!([])).await;
    respond(
        server,
        "/repos/acme/widgets/pulls/1/files",
        json!([
            { "filename": "src/lib.rs", "additions": 10, "deletions": 2 },
            { "filename": "README.md", "additions": 1, "deletions": 0 }
        ]),
    )
    .await;
    respond(
        server,
        "/repos/acme/widgets/issues/1/comments",
        json!([
            { "id": 10, "user": { "login": "author" } },
            { "id": 11, "user": { "login": "bystander" } }
        ]),
    )
    .await;
}

#[tokio::test]
async fn test_collects_only_reviewed_long_lived_pull_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("state", "closed"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            pull(1, Duration::hours(2), true),
            pull(2, Duration::minutes(30), true),
            pull(3, Duration::hours(5), false),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_reference_repository(&server).await;

    let collector = Collector::new(&config(&server)).unwrap();
    let collection = collector
        .collect(&[RepositoryDescriptor::from_full_name("acme/widgets")])
        .await;

    assert_eq!(collection.dataset.len(), 1);
    let item = &collection.dataset.items()[0];
    assert_eq!(item.pull_request.number, 1);
    assert_eq!(item.time.as_ref().unwrap().time_analysis_hours, 2.0);
    assert_eq!(item.files.unwrap().num_files, 2);
    assert_eq!(item.files.unwrap().total_additions, 11);
    let interaction = item.interaction.unwrap();
    assert_eq!(interaction.num_comments, 2);
    assert_eq!(interaction.num_participants, 3);
    assert_eq!(collection.report.rejected_no_reviews, 1);
    assert_eq!(collection.report.rejected_too_fast, 1);
    assert_eq!(collector.fetcher().gate().cooldowns(), 0);

    let dir = tempfile::tempdir().unwrap();
    let sink = CsvSink::new(dir.path().join("pull_requests.csv"));
    sink.persist(&collection.dataset).unwrap();

    let mut reader = csv::Reader::from_path(sink.path()).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, COLUMNS.to_vec());
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][1], "1");
    assert_eq!(&rows[0][2], "acme/widgets");
    assert_eq!(&rows[0][5], "true");
}

#[tokio::test]
async fn test_forbidden_response_cools_down_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([pull(1, Duration::hours(2), true)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_reference_repository(&server).await;

    let collector = Collector::new(&config(&server)).unwrap();
    let collection = collector
        .collect(&[RepositoryDescriptor::from_full_name("acme/widgets")])
        .await;

    assert_eq!(collection.dataset.len(), 1);
    assert_eq!(collection.report.repositories_failed, 0);
    assert_eq!(collector.fetcher().gate().cooldowns(), 1);
}

#[tokio::test]
async fn test_persistent_throttling_ends_the_repository_but_not_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/blocked/pulls"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    respond(
        &server,
        "/repos/acme/widgets/pulls",
        json!([pull(1, Duration::hours(2), false)]),
    )
    .await;
    mount_reference_repository(&server).await;

    let mut config = config(&server);
    config.max_rate_limit_retries = 2;
    let collector = Collector::new(&config).unwrap();
    let collection = collector
        .collect(&[
            RepositoryDescriptor::from_full_name("acme/blocked"),
            RepositoryDescriptor::from_full_name("acme/widgets"),
        ])
        .await;

    assert_eq!(collection.dataset.len(), 1);
    assert_eq!(collection.dataset.items()[0].repository.to_string(), "acme/widgets");
    assert_eq!(collection.report.repositories_processed, 2);
    assert_eq!(collector.fetcher().gate().cooldowns(), 2);
}

#[tokio::test]
async fn test_discovered_repositories_feed_a_collection_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", "stars:>1000"))
        .and(query_param("sort", "stars"))
        .and(query_param("order", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 2,
            "items": [
                { "id": 1, "name": "widgets", "full_name": "acme/widgets", "stargazers_count": 4200 },
                { "id": 2, "name": "tiny", "full_name": "acme/tiny", "stargazers_count": 1100 }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("q", "repo:acme/widgets is:pr is:closed"))
        .and(query_param("per_page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "total_count": 250, "items": [] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("q", "repo:acme/tiny is:pr is:closed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "total_count": 3, "items": [] })),
        )
        .mount(&server)
        .await;
    respond(
        &server,
        "/repos/acme/widgets/pulls",
        json!([pull(1, Duration::hours(2), true)]),
    )
    .await;
    mount_reference_repository(&server).await;

    let collector = Collector::new(&config(&server)).unwrap();
    let repositories = discovery::discover(collector.fetcher(), &DiscoverySettings::default()).await;
    assert_eq!(repositories.len(), 1);
    assert_eq!(repositories[0].total_closed_prs, Some(250));

    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("repositories.json");
    save_repositories(&list, &repositories).unwrap();
    let loaded = load_repositories(&list).unwrap();
    assert_eq!(loaded, repositories);

    let collection = collector.collect(&loaded).await;
    assert_eq!(collection.dataset.len(), 1);
    assert_eq!(collection.dataset.summary().merged, 1);
}

#[tokio::test]
async fn test_server_error_is_requested_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let collector = Collector::new(&config(&server)).unwrap();
    let collection = collector
        .collect(&[RepositoryDescriptor::from_full_name("acme/widgets")])
        .await;

    let requests = server.received_requests().await.unwrap();
    let listing_requests = requests
        .iter()
        .filter(|request| request.url.path() == "/repos/acme/widgets/pulls")
        .count();
    assert_eq!(listing_requests, 1);
    assert!(collection.dataset.is_empty());
    assert_eq!(collector.fetcher().gate().cooldowns(), 0);
}

#[tokio::test]
async fn test_too_many_requests_goes_through_the_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([pull(1, Duration::hours(2), true)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_reference_repository(&server).await;

    let collector = Collector::new(&config(&server)).unwrap();
    let collection = collector
        .collect(&[RepositoryDescriptor::from_full_name("acme/widgets")])
        .await;

    assert_eq!(collection.dataset.len(), 1);
    assert_eq!(collector.fetcher().gate().cooldowns(), 1);
}

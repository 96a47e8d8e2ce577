use repo_backup_core::contract::RepositoryLister;
use repo_backup_core::enumerate::{GitHubLister, PAGE_SIZE};
use repo_backup_core::BackupError;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn repo_json(i: usize) -> Value {
    json!({
        "id": i,
        "name": format!("repo-{i}"),
        "full_name": format!("octo/repo-{i}"),
        "clone_url": format!("https://github.com/octo/repo-{i}.git"),
        "private": i % 2 == 0,
        "default_branch": "main"
    })
}

fn page(range: std::ops::Range<usize>) -> Value {
    Value::Array(range.map(repo_json).collect())
}

#[tokio::test]
async fn pages_through_all_results_in_provider_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("per_page", PAGE_SIZE.to_string()))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer ghp_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..PAGE_SIZE)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(PAGE_SIZE..PAGE_SIZE + 3)))
        .expect(1)
        .mount(&server)
        .await;

    let lister = GitHubLister::new(server.uri());
    let repos = lister.list_repositories("ghp_token").await.unwrap();

    assert_eq!(repos.len(), PAGE_SIZE + 3);
    assert_eq!(repos[0].name, "repo-0");
    assert_eq!(repos[PAGE_SIZE].full_name, format!("octo/repo-{PAGE_SIZE}"));
    assert_eq!(
        repos.last().unwrap().clone_url,
        format!("https://github.com/octo/repo-{}.git", PAGE_SIZE + 2)
    );
}

#[tokio::test]
async fn full_last_page_is_followed_by_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..PAGE_SIZE)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let repos = GitHubLister::new(server.uri())
        .list_repositories("t")
        .await
        .unwrap();
    assert_eq!(repos.len(), PAGE_SIZE);
}

#[tokio::test]
async fn rejected_token_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})),
        )
        .mount(&server)
        .await;

    let err = GitHubLister::new(server.uri())
        .list_repositories("expired")
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::Auth(msg) if msg.contains("Bad credentials")));
}

#[tokio::test]
async fn server_error_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = GitHubLister::new(server.uri())
        .list_repositories("t")
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::Provider(_)));
}

#[tokio::test]
async fn malformed_listing_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = GitHubLister::new(server.uri())
        .list_repositories("t")
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::Provider(_)));
}

#[tokio::test]
async fn unreachable_provider_is_a_provider_error() {
    let err = GitHubLister::new("http://127.0.0.1:1")
        .list_repositories("t")
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::Provider(_)));
}

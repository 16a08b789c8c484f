//! Evaluation against a mocked `/api/analyze` endpoint.

use std::sync::Arc;

use codeguard::api::ApiClient;
use codeguard::config::ApiConfig;
use codeguard::evaluate::{EvaluationRunner, RemoteBackend};
use codeguard::testset::{TestCase, TestSet};
use codeguard::Label;
use httpmock::prelude::*;
use serde_json::json;

fn case(id: &str, code: &str, expected: Label) -> TestCase {
    TestCase {
        id: id.into(),
        name: id.into(),
        prompt: "Do the thing.".into(),
        code: code.into(),
        expected,
        bug_type: None,
    }
}

#[tokio::test]
#[ignore = "requires loopback networking"]
async fn test_remote_run_excludes_bad_gateway() {
    let server = MockServer::start();
    let buggy = server.mock(|when, then| {
        when.method(POST)
            .path("/api/analyze")
            .json_body_partial(r#"{"code": "x = y"}"#);
        then.status(200).json_body(json!({
            "verdict": "bug",
            "severity_score": 8.0,
            "bug_patterns": [{"pattern_name": "hallucinated_object", "description": "y"}]
        }));
    });
    let clean = server.mock(|when, then| {
        when.method(POST)
            .path("/api/analyze")
            .json_body_partial(r#"{"code": "x = 1"}"#);
        then.status(200)
            .json_body(json!({"has_bugs": false, "overall_severity": 0.0}));
    });
    let gateway = server.mock(|when, then| {
        when.method(POST)
            .path("/api/analyze")
            .json_body_partial(r#"{"code": "slow()"}"#);
        then.status(502).body("Bad Gateway");
    });

    let client = ApiClient::new(&ApiConfig {
        endpoint: server.url("/api/analyze"),
        timeout_secs: 5,
        max_retries: 0,
    })
    .unwrap();
    let runner = EvaluationRunner::new(Arc::new(RemoteBackend::new(client)));

    let set = TestSet {
        test_set_id: 9,
        name: "remote".into(),
        description: None,
        test_cases: vec![
            case("a", "x = y", Label::Bug),
            case("b", "x = 1", Label::Clean),
            case("c", "slow()", Label::Bug),
        ],
    };
    let results = runner.run_set(&set).await.unwrap();

    assert_eq!(results.total_cases, 3);
    assert_eq!(results.errors, 1);
    assert_eq!(results.evaluated, 2);
    assert_eq!(results.correct, 2);
    assert_eq!(results.accuracy, 100.0);
    assert!(results.results[2].transient);
    assert_eq!(results.results[0].bugs_found[0].pattern, "hallucinated_object");

    buggy.assert();
    clean.assert();
    gateway.assert();
}

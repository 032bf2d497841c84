//! End-to-end tests: HTTP submission, queue, worker, analysis service
//! (mocked with wiremock), and the read endpoints, over a real SQLite file.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use idea_pipeline::analysis::{ChatAnalysisClient, IdeaAnalyzer};
use idea_pipeline::auth::SessionAuth;
use idea_pipeline::config::Config;
use idea_pipeline::db;
use idea_pipeline::dispatch::Dispatcher;
use idea_pipeline::migrate::apply_schema;
use idea_pipeline::queue::SqliteQueue;
use idea_pipeline::server::{router, AppState};
use idea_pipeline::sqlite_store::SqliteStore;
use idea_pipeline::verify::DisabledVerifier;
use idea_pipeline::worker::Worker;
use idea_pipeline_core::store::Store;

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let config_content = format!(
        r#"
[db]
path = "{}/data/ideas.sqlite"

[server]
bind = "127.0.0.1:{}"

[submission]
daily_limit = 3

[worker]
embedded = false
"#,
        tmp.path().display(),
        port
    );
    toml::from_str(&config_content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn report_json() -> Value {
    serde_json::json!({
        "one_sentence": "Neighbourhood tool rental.",
        "market_signals": ["DIY growth", "Urban density", "Third"],
        "competitors": [{"name": "Toolshare", "brief_note": "regional"}],
        "moat_risks": ["low switching cost"],
        "go_to_market": ["hardware stores"],
        "monetization": ["rental fee"],
        "feasibility_factors": ["insurance"],
        "rubric_inputs": {
            "market_size": 3,
            "competition_intensity": 2,
            "novelty": 4,
            "execution_complexity": 1,
            "monetization_clarity": 3
        }
    })
}

async fn mock_analysis(expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": report_json().to_string() } }]
        })))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

async fn add_session(pool: &SqlitePool, session_id: &str, user_id: &str) {
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(session_id)
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp() + 3600)
        .execute(pool)
        .await
        .unwrap();
}

struct TestApp {
    _tmp: TempDir,
    base: String,
    pool: SqlitePool,
    queue: Arc<SqliteQueue>,
    worker: Arc<Worker>,
    client: reqwest::Client,
}

impl TestApp {
    async fn start(analysis: &MockServer) -> Self {
        let tmp = TempDir::new().unwrap();
        let port = find_free_port();
        let config = test_config(&tmp, port);

        let pool = db::connect(&config).await.unwrap();
        apply_schema(&pool).await.unwrap();
        add_session(&pool, "alice-session", "alice").await;
        add_session(&pool, "bob-session", "bob").await;

        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
        let queue = Arc::new(SqliteQueue::new(pool.clone(), 120));
        let analyzer: Arc<dyn IdeaAnalyzer> = Arc::new(
            ChatAnalysisClient::new("test-key", "sonar")
                .with_endpoint(analysis.uri())
                .with_timeout(Duration::from_secs(5)),
        );
        let worker = Arc::new(Worker::new(
            store.clone(),
            queue.clone(),
            analyzer,
            &config.worker,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::new(DisabledVerifier),
            config.submission.daily_limit,
        ));

        let state = AppState {
            store,
            dispatcher,
            auth: Arc::new(SessionAuth::new(pool.clone())),
            utc_offset_minutes: 0,
        };
        let listener = tokio::net::TcpListener::bind(&config.server.bind)
            .await
            .unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.ok();
        });
        wait_for_server(port).await;

        Self {
            _tmp: tmp,
            base: format!("http://127.0.0.1:{}", port),
            pool,
            queue,
            worker,
            client: reqwest::Client::new(),
        }
    }

    async fn submit(&self, session: Option<&str>, title: &str, description: &str) -> (u16, Value) {
        let mut req = self
            .client
            .post(format!("{}/api/ideas", self.base))
            .json(&serde_json::json!({
                "title": title,
                "description": description,
                "verificationToken": "token-0123456789",
            }));
        if let Some(session) = session {
            req = req.header("cookie", format!("fc_session={}", session));
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str, session: Option<&str>) -> (u16, Value) {
        let mut req = self.client.get(format!("{}{}", self.base, path));
        if let Some(session) = session {
            req = req.header("cookie", format!("fc_session={}", session));
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

const DESCRIPTION: &str = "Share drills and ladders with your neighbours";

// ─── Tests ──────────────────────────────────────────────────────────

/// A queued idea is scored by the worker and cached; an identical idea
/// (modulo case and surrounding whitespace) is then scored on submission
/// with no job and no second analysis call.
#[tokio::test]
async fn test_cache_serves_duplicate_submission() {
    let analysis = mock_analysis(1).await;
    let app = TestApp::start(&analysis).await;

    let (status, body) = app
        .submit(Some("alice-session"), "Tool Library", DESCRIPTION)
        .await;
    assert_eq!(status, 202, "body: {}", body);
    assert_eq!(body["status"], "queued");
    let first_id = body["id"].as_str().unwrap().to_string();

    let (_, pending) = app
        .get(&format!("/api/ideas/{}", first_id), Some("alice-session"))
        .await;
    assert_eq!(pending["status"], "queued");
    assert!(pending["score"].is_null());

    assert_eq!(app.worker.run_once().await.unwrap(), 1);
    assert!(app.queue.is_empty().await.unwrap());

    let (status, scored) = app
        .get(&format!("/api/ideas/{}", first_id), Some("alice-session"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(scored["status"], "scored");
    assert_eq!(scored["score"], 50);
    assert_eq!(
        scored["analysis_summary"],
        "Neighbourhood tool rental. | DIY growth | Urban density | Top competitor: Toolshare | Risk: low switching cost"
    );

    let cached: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM idea_cache")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(cached, 1);

    let (status, body) = app
        .submit(
            Some("bob-session"),
            "  tool library ",
            &format!("  {}  ", DESCRIPTION.to_uppercase()),
        )
        .await;
    assert_eq!(status, 201, "body: {}", body);
    assert_eq!(body["status"], "scored");
    assert!(app.queue.is_empty().await.unwrap());

    let (_, second) = app
        .get(&format!("/api/ideas/{}", body["id"].as_str().unwrap()), Some("bob-session"))
        .await;
    assert_eq!(second["score"], 50);
    assert_eq!(second["idea_hash"], scored["idea_hash"]);

    let (_, board) = app.get("/api/leaderboard", None).await;
    assert_eq!(board.as_array().unwrap().len(), 2);
    // Mock expectation (exactly one analysis call) is verified on drop.
}

#[tokio::test]
async fn test_read_endpoint_redacts_for_non_owners() {
    let analysis = mock_analysis(1).await;
    let app = TestApp::start(&analysis).await;

    let (_, body) = app
        .submit(Some("alice-session"), "Tool Library", DESCRIPTION)
        .await;
    let id = body["id"].as_str().unwrap().to_string();
    app.worker.run_once().await.unwrap();
    let path = format!("/api/ideas/{}", id);

    let (_, owner) = app.get(&path, Some("alice-session")).await;
    assert_eq!(owner["owner_id"], "alice");
    assert!(owner["idea_hash"].is_string());
    assert!(owner["analysis_raw"].is_string());
    assert_eq!(owner["owner_anon"], false);

    for session in [Some("bob-session"), None] {
        let (status, view) = app.get(&path, session).await;
        assert_eq!(status, 200);
        assert!(view.get("owner_id").is_none());
        assert!(view.get("idea_hash").is_none());
        assert!(view.get("analysis_raw").is_none());
        assert_eq!(view["owner_anon"], true);
        assert_eq!(view["score"], 50);
    }

    let (status, mine) = app.get("/api/me/ideas", Some("alice-session")).await;
    assert_eq!(status, 200);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = app.get("/api/me/ideas", Some("bob-session")).await;
    assert!(theirs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_submission_errors() {
    let analysis = mock_analysis(0).await;
    let app = TestApp::start(&analysis).await;

    let (status, body) = app.submit(None, "Tool Library", DESCRIPTION).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, body) = app
        .submit(Some("alice-session"), "Tool Library", &"x".repeat(19))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = app
        .submit(Some("alice-session"), "Tool Library", &"x".repeat(20))
        .await;
    assert_eq!(status, 202);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ideas")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_rate_limit_over_http() {
    let analysis = mock_analysis(0).await;
    let app = TestApp::start(&analysis).await;

    for i in 0..3 {
        let (status, _) = app
            .submit(Some("alice-session"), &format!("Idea number {}", i), DESCRIPTION)
            .await;
        assert_eq!(status, 202);
    }
    let (status, body) = app
        .submit(Some("alice-session"), "Idea number 4", DESCRIPTION)
        .await;
    assert_eq!(status, 429);
    assert_eq!(body["error"]["code"], "rate_limited");

    // Another owner still has their own quota.
    let (status, _) = app
        .submit(Some("bob-session"), "Idea number 4", DESCRIPTION)
        .await;
    assert_eq!(status, 202);
}

#[tokio::test]
async fn test_read_endpoint_edges() {
    let analysis = mock_analysis(0).await;
    let app = TestApp::start(&analysis).await;

    let (status, body) = app.get("/api/ideas/does-not-exist", None).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = app.get("/api/me/ideas", None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, body) = app.get("/api/best-of-day", None).await;
    assert_eq!(status, 200);
    assert!(body.is_null());

    let (status, _) = app.get("/api/best-of-day?utc_offset_minutes=9999", None).await;
    assert_eq!(status, 400);

    let (status, body) = app.get("/api/leaderboard?limit=5", None).await;
    assert_eq!(status, 200);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_best_of_day_picks_todays_top_score() {
    let analysis = mock_analysis(1).await;
    let app = TestApp::start(&analysis).await;

    let (_, body) = app
        .submit(Some("alice-session"), "Tool Library", DESCRIPTION)
        .await;
    app.worker.run_once().await.unwrap();

    let (status, best) = app.get("/api/best-of-day?utc_offset_minutes=0", None).await;
    assert_eq!(status, 200);
    assert_eq!(best["id"], body["id"]);
    assert_eq!(best["owner_anon"], true);
}

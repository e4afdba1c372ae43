use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use super::gateway::{ApiGateway, AuthorizationPrompt};
use super::store::CredentialStore;
use super::tokens::{RefreshOutcome, TokenClient};
use super::transport::{HttpReply, HttpTransport, TransportError};
use super::AuthError;
use crate::config::{PlatformConfig, SheetEngine};

fn test_config() -> PlatformConfig {
    PlatformConfig {
        client_id: "abc".to_string(),
        client_secret: "s3cret".to_string(),
        base_url: "https://platform.test".to_string(),
        redirect_uri: "https://x/cb".to_string(),
        oauth_scope: "data:read".to_string(),
        credential_file: PathBuf::from("refresh_token.txt"),
        sheet_engine: SheetEngine::Library,
        template_dir: PathBuf::from("templates"),
        output_dir: PathBuf::from("modified_files"),
        converter_cmd: "libreoffice".to_string(),
        bridge_cmd: "sheet-bridge".to_string(),
        sync_root: PathBuf::from("synced"),
        sync_agent_cmd: "cloudsync".to_string(),
        cell_map_file: None,
    }
}

#[derive(Default)]
struct FakeTransport {
    post_replies: Mutex<VecDeque<HttpReply>>,
    get_replies: Mutex<VecDeque<HttpReply>>,
    posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
    gets: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn queue_post(&self, status: u16, body: serde_json::Value) {
        self.post_replies.lock().unwrap().push_back(HttpReply {
            status,
            body: body.to_string(),
        });
    }

    fn queue_get(&self, status: u16, body: serde_json::Value) {
        self.get_replies.lock().unwrap().push_back(HttpReply {
            status,
            body: body.to_string(),
        });
    }

    fn refresh_posts(&self) -> usize {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, form)| {
                form.iter()
                    .any(|(k, v)| k == "grant_type" && v == "refresh_token")
            })
            .count()
    }

    fn get_count(&self) -> usize {
        self.gets.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError> {
        self.posts.lock().unwrap().push((
            url.to_string(),
            form.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        self.post_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Unavailable("no scripted POST reply".into()))
    }

    async fn get(
        &self,
        url: &str,
        _bearer: &str,
        _params: &[(String, String)],
    ) -> Result<HttpReply, TransportError> {
        self.gets.lock().unwrap().push(url.to_string());
        self.get_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Unavailable("no scripted GET reply".into()))
    }
}

struct ScriptedPrompt {
    code: String,
    calls: Mutex<usize>,
}

impl ScriptedPrompt {
    fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl AuthorizationPrompt for ScriptedPrompt {
    async fn obtain_code(&self, _authorization_url: &str) -> Result<String, AuthError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.code.clone())
    }
}

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({ "access_token": access, "refresh_token": refresh })
}

struct Fixture {
    _dir: TempDir,
    store: CredentialStore,
    transport: Arc<FakeTransport>,
    config: Arc<PlatformConfig>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::new(dir.path().join("refresh_token.txt"));
    Fixture {
        _dir: dir,
        store,
        transport: Arc::new(FakeTransport::default()),
        config: Arc::new(test_config()),
    }
}

fn client(fx: &Fixture) -> TokenClient {
    TokenClient::new(fx.config.clone(), fx.transport.clone(), fx.store.clone())
}

fn gateway(fx: &Fixture, prompt: Arc<dyn AuthorizationPrompt>) -> ApiGateway {
    ApiGateway::new(fx.config.clone(), client(fx), fx.transport.clone(), prompt)
}

#[test]
fn authorization_url_encodes_client_identity_and_scope() {
    let fx = fixture();
    let url = client(&fx).authorization_url();
    assert!(url.starts_with("https://platform.test/authentication/v2/authorize?"));
    assert!(url.contains(
        "client_id=abc&response_type=code&redirect_uri=https%3A%2F%2Fx%2Fcb&scope=data%3Aread"
    ));
}

#[tokio::test]
async fn exchange_persists_refresh_token() {
    let fx = fixture();
    fx.transport.queue_post(200, token_body("acc-1", "ref-1"));

    let pair = client(&fx)
        .exchange_authorization_code("one-time-code")
        .await
        .unwrap();

    assert_eq!(pair.access_token, "acc-1");
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("ref-1"));
}

#[tokio::test]
async fn exchange_without_refresh_token_is_an_error() {
    let fx = fixture();
    fx.transport.queue_post(200, json!({ "access_token": "acc-only" }));

    let err = client(&fx)
        .exchange_authorization_code("code")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ExchangeIncomplete("refresh_token")));
    assert_eq!(fx.store.load().unwrap(), None);
}

#[tokio::test]
async fn refresh_persists_only_the_latest_token() {
    let fx = fixture();
    fx.store.save("ref-0").unwrap();
    fx.transport.queue_post(200, token_body("acc-1", "ref-1"));
    fx.transport.queue_post(200, token_body("acc-2", "ref-2"));

    let tokens = client(&fx);
    match tokens.refresh("ref-0").await.unwrap() {
        RefreshOutcome::Rotated(pair) => assert_eq!(pair.refresh_token, "ref-1"),
        RefreshOutcome::Invalid => panic!("unexpected invalid_grant"),
    }
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("ref-1"));

    tokens.refresh("ref-1").await.unwrap();
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("ref-2"));
}

#[tokio::test]
async fn refresh_invalid_grant_is_a_sentinel_and_leaves_store_alone() {
    let fx = fixture();
    fx.store.save("dead-token").unwrap();
    fx.transport.queue_post(400, json!({ "error": "invalid_grant" }));

    let outcome = client(&fx).refresh("dead-token").await.unwrap();
    assert!(matches!(outcome, RefreshOutcome::Invalid));
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("dead-token"));
}

#[tokio::test]
async fn refresh_other_http_error_propagates() {
    let fx = fixture();
    fx.transport
        .queue_post(500, json!({ "error": "internal" }));

    let err = client(&fx).refresh("ref").await.unwrap_err();
    match err {
        AuthError::Remote { status, .. } => assert_eq!(status, 500),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn call_retries_exactly_once_after_401() {
    let fx = fixture();
    fx.store.save("ref-0").unwrap();
    // Proactive refresh, then the reactive one after the 401.
    fx.transport.queue_post(200, token_body("acc-1", "ref-1"));
    fx.transport.queue_post(200, token_body("acc-2", "ref-2"));
    fx.transport.queue_get(401, json!({ "error": "expired" }));
    fx.transport.queue_get(200, json!({ "data": [ { "id": "f1" } ] }));

    let gw = gateway(&fx, Arc::new(ScriptedPrompt::new("unused")));
    let body = gw.call("construction/forms/v1/projects/p/forms", &[]).await.unwrap();

    assert_eq!(body["data"][0]["id"], "f1");
    assert_eq!(fx.transport.get_count(), 2);
    // One proactive refresh plus exactly one triggered by the 401.
    assert_eq!(fx.transport.refresh_posts(), 2);
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("ref-2"));
}

#[tokio::test]
async fn call_never_issues_a_third_data_request() {
    let fx = fixture();
    fx.store.save("ref-0").unwrap();
    fx.transport.queue_post(200, token_body("acc-1", "ref-1"));
    fx.transport.queue_post(200, token_body("acc-2", "ref-2"));
    fx.transport.queue_get(401, json!({}));
    fx.transport.queue_get(401, json!({}));
    // Extra replies that must never be consumed.
    fx.transport.queue_get(200, json!({ "data": [] }));

    let gw = gateway(&fx, Arc::new(ScriptedPrompt::new("unused")));
    let err = gw.call("forms", &[]).await.unwrap_err();

    assert!(matches!(err, AuthError::Unauthorized));
    assert_eq!(fx.transport.get_count(), 2);
}

#[tokio::test]
async fn call_without_credential_runs_interactive_flow() {
    let fx = fixture();
    fx.transport.queue_post(200, token_body("acc-1", "ref-1"));
    fx.transport.queue_get(200, json!({ "results": [] }));

    let prompt = Arc::new(ScriptedPrompt::new("the-code"));
    let gw = gateway(&fx, prompt.clone());
    let body = gw.call("cost/v1/containers/c/budgets", &[]).await.unwrap();

    assert_eq!(body["results"].as_array().unwrap().len(), 0);
    assert_eq!(*prompt.calls.lock().unwrap(), 1);
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("ref-1"));
}

#[tokio::test]
async fn dead_refresh_token_escalates_to_interactive_flow() {
    let fx = fixture();
    fx.store.save("dead").unwrap();
    fx.transport.queue_post(400, json!({ "error": "invalid_grant" }));
    fx.transport.queue_post(200, token_body("acc-9", "ref-9"));
    fx.transport.queue_get(200, json!({ "data": [] }));

    let prompt = Arc::new(ScriptedPrompt::new("fresh-code"));
    let gw = gateway(&fx, prompt.clone());
    gw.call("forms", &[]).await.unwrap();

    assert_eq!(*prompt.calls.lock().unwrap(), 1);
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("ref-9"));
}

#[tokio::test]
async fn non_401_error_propagates_with_body() {
    let fx = fixture();
    fx.store.save("ref-0").unwrap();
    fx.transport.queue_post(200, token_body("acc-1", "ref-1"));
    fx.transport.queue_get(403, json!({ "detail": "no access to container" }));

    let gw = gateway(&fx, Arc::new(ScriptedPrompt::new("unused")));
    let err = gw.call("cost/v1/containers/c/payments", &[]).await.unwrap_err();

    match err {
        AuthError::Remote { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("no access to container"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.transport.get_count(), 1);
}

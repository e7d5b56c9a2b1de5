use std::path::{Path, PathBuf};

use creator_link_lib::client::HttpServiceApi;
use creator_link_lib::domain::token_store::TokenSet;
use creator_link_lib::{test_support, ServerManager};
use tempfile::TempDir;
use wiremock::MockServer;

pub const TEST_USER_NAME: &str = "Ada";
pub const TEST_USER_EMAIL: &str = "ada@example.com";

/// A running service backed by a temp database, with every Google endpoint pointed at `provider`.
pub struct TestService {
    pub provider: MockServer,
    pub base_url: String,
    pub user_id: i64,
    pub bearer: String,
    db_path: PathBuf,
    server: ServerManager,
    _dir: TempDir,
}

impl TestService {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("creator-link.db");
        let provider = MockServer::start().await;

        test_support::init_db(&db_path).expect("init db");
        let user_id =
            test_support::create_user(&db_path, TEST_USER_NAME, TEST_USER_EMAIL).expect("user");
        let bearer = test_support::issue_session(&db_path, user_id).expect("session");

        let config = test_support::test_config(&db_path, &provider.uri());
        let server = creator_link_lib::start_server(config)
            .await
            .expect("start server");
        let base_url = server.status().base_url.expect("base url");

        Self {
            provider,
            base_url,
            user_id,
            bearer,
            db_path,
            server,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[allow(dead_code)]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[allow(dead_code)]
    pub fn http(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    #[allow(dead_code)]
    pub fn api(&self) -> HttpServiceApi {
        HttpServiceApi::new(reqwest::Client::new(), &self.base_url, &self.bearer)
    }

    #[allow(dead_code)]
    pub fn seed_tokens(&self, access: &str, refresh: Option<&str>, expiry: Option<i64>) {
        test_support::seed_youtube_tokens(&self.db_path, self.user_id, access, refresh, expiry)
            .expect("seed tokens");
    }

    #[allow(dead_code)]
    pub fn tokens(&self) -> TokenSet {
        test_support::read_youtube_tokens(&self.db_path, self.user_id).expect("read tokens")
    }

    pub async fn shutdown(mut self) {
        self.server.stop().await;
    }
}

#[allow(dead_code)]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[allow(dead_code)]
pub fn query_param(url: &str, key: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .expect("url")
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

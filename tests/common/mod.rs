#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use sqlgate::auth::{PasswordHasher, Session};
use sqlgate::config::ServerConfig;
use sqlgate::engine::{
    Engine, EngineConnection, EngineError, EngineErrorKind, EngineResult, SqliteEngine,
};
use sqlgate::server::{AppState, create_router};
use sqlgate::service::identity;
use sqlgate::store::{SqliteStore, Store};
use sqlgate::types::{PermissionLevel, Role, User};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-pass-123";

/// Latency and failure injection around the file-backed engine.
#[derive(Default)]
pub struct Script {
    delays: Mutex<HashMap<&'static str, Duration>>,
    failures: Mutex<HashMap<&'static str, EngineErrorKind>>,
    active_backups: Mutex<HashMap<String, usize>>,
    peak_per_name: Mutex<HashMap<String, usize>>,
    peak_total: Mutex<usize>,
}

impl Script {
    pub fn delay(&self, op: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(op, delay);
    }

    /// Fails the next call of `op` with `kind`.
    pub fn fail_once(&self, op: &'static str, kind: EngineErrorKind) {
        self.failures.lock().unwrap().insert(op, kind);
    }

    /// Most backups of `name` that were ever running at once.
    pub fn peak_backups_of(&self, name: &str) -> usize {
        self.peak_per_name
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Most backups of any name that were ever running at once.
    pub fn peak_backups(&self) -> usize {
        *self.peak_total.lock().unwrap()
    }

    fn before(&self, op: &'static str) -> EngineResult<()> {
        let delay = self.delays.lock().unwrap().get(op).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        match self.failures.lock().unwrap().remove(op) {
            Some(kind) => Err(EngineError::new(kind, format!("scripted {op} failure"))),
            None => Ok(()),
        }
    }

    fn backup_started(&self, name: &str) {
        let mut active = self.active_backups.lock().unwrap();
        let count = active.entry(name.to_string()).or_default();
        *count += 1;

        let mut peaks = self.peak_per_name.lock().unwrap();
        let peak = peaks.entry(name.to_string()).or_default();
        *peak = (*peak).max(*count);

        let total: usize = active.values().sum();
        let mut peak_total = self.peak_total.lock().unwrap();
        *peak_total = (*peak_total).max(total);
    }

    fn backup_finished(&self, name: &str) {
        let mut active = self.active_backups.lock().unwrap();
        if let Some(count) = active.get_mut(name) {
            *count -= 1;
        }
    }
}

pub struct ScriptedEngine {
    inner: SqliteEngine,
    script: Arc<Script>,
}

impl Engine for ScriptedEngine {
    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>> {
        Ok(Box::new(ScriptedConnection {
            inner: self.inner.connect()?,
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedConnection {
    inner: Box<dyn EngineConnection>,
    script: Arc<Script>,
}

impl EngineConnection for ScriptedConnection {
    fn create_login(&mut self, login: &str, password: &str) -> EngineResult<()> {
        self.script.before("create_login")?;
        self.inner.create_login(login, password)
    }

    fn drop_login(&mut self, login: &str) -> EngineResult<()> {
        self.script.before("drop_login")?;
        self.inner.drop_login(login)
    }

    fn database_exists(&mut self, name: &str) -> EngineResult<bool> {
        self.script.before("database_exists")?;
        self.inner.database_exists(name)
    }

    fn create_database(&mut self, name: &str, collation: &str) -> EngineResult<()> {
        self.script.before("create_database")?;
        self.inner.create_database(name, collation)
    }

    fn drop_database(&mut self, name: &str) -> EngineResult<()> {
        self.script.before("drop_database")?;
        self.inner.drop_database(name)
    }

    fn database_size_mb(&mut self, name: &str) -> EngineResult<f64> {
        self.inner.database_size_mb(name)
    }

    fn grant(&mut self, database: &str, login: &str, level: PermissionLevel) -> EngineResult<()> {
        self.script.before("grant")?;
        self.inner.grant(database, login, level)
    }

    fn revoke(&mut self, database: &str, login: &str) -> EngineResult<()> {
        self.script.before("revoke")?;
        self.inner.revoke(database, login)
    }

    fn backup_database(&mut self, name: &str, dest: &Path) -> EngineResult<u64> {
        self.script.backup_started(name);
        let result = self
            .script
            .before("backup_database")
            .and_then(|()| self.inner.backup_database(name, dest));
        self.script.backup_finished(name);
        result
    }
}

/// Application state over a scratch directory, without HTTP.
pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: Arc<AppState>,
    pub script: Arc<Script>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let mut config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        tweak(&mut config);

        let store = SqliteStore::new(config.db_path()).expect("open store");
        store.initialize().expect("initialize store");

        let script = Arc::new(Script::default());
        let engine = ScriptedEngine {
            inner: SqliteEngine::open(config.engine_dir(), config.engine.command_timeout())
                .expect("open engine"),
            script: Arc::clone(&script),
        };

        let state = AppState::new(
            config,
            Arc::new(store),
            Arc::new(engine),
            &[1u8; 32],
            &[2u8; 32],
        )
        .expect("build state");

        Self {
            temp_dir,
            state: Arc::new(state),
            script,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn create_user(&self, email: &str, role: Role) -> User {
        identity::create_user(
            self.state.store.as_ref(),
            &PasswordHasher::new(),
            email,
            "password-123",
            None,
            role,
        )
        .expect("create user")
    }

    /// A verified session for `user`, as the HTTP layer would see it.
    pub fn session(&self, user: &User) -> Session {
        let token = self.state.sessions.issue(user).expect("issue token");
        self.state.sessions.verify(&token).expect("verify token")
    }
}

/// The router served in-process on an ephemeral port.
pub struct TestServer {
    pub ctx: TestContext,
    pub base_url: String,
    pub client: reqwest::Client,
    server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(TestContext::new()).await
    }

    pub async fn start_with(ctx: TestContext) -> Self {
        identity::create_user(
            ctx.state.store.as_ref(),
            &PasswordHasher::new(),
            ADMIN_EMAIL,
            ADMIN_PASSWORD,
            None,
            Role::Admin,
        )
        .expect("create admin");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let app = create_router(Arc::clone(&ctx.state));

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            ctx,
            base_url: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
            server,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn script(&self) -> &Script {
        &self.ctx.script
    }

    pub async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/register"))
            .json(&json!({ "email": email, "password": password, "name": "Test" }))
            .send()
            .await
            .expect("register")
    }

    /// Logs in and returns the session token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login");
        assert_eq!(resp.status(), 200, "login failed for {email}");
        let body: Value = resp.json().await.expect("login body");
        body["data"]["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }

    /// Registers a fresh user and returns (user id, token).
    pub async fn tenant(&self, email: &str) -> (String, String) {
        let resp = self.register(email, "password-123").await;
        assert_eq!(resp.status(), 201, "register failed for {email}");
        let body: Value = resp.json().await.expect("register body");
        let id = body["data"]["id"].as_str().expect("user id").to_string();
        (id, self.login(email, "password-123").await)
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    pub async fn get(&self, path: &str, token: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("GET");
        Self::read(resp).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("POST");
        Self::read(resp).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> (u16, Value) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("DELETE");
        Self::read(resp).await
    }

    async fn read(resp: reqwest::Response) -> (u16, Value) {
        let status = resp.status().as_u16();
        let body = resp.json().await.unwrap_or(Value::Null);
        (status, body)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

use std::collections::{HashMap, VecDeque};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use portal::auth::{jwt::JwtService, password};
use portal::config::{AppConfig, StorageBackend};
use portal::db::{self, PgPool, MIGRATIONS};
use portal::llm::{CompletionRequest, LanguageModel, LlmError};
use portal::mail::{MailError, Mailer, OutgoingEmail};
use portal::models::NewUser;
use portal::routes;
use portal::state::AppState;
use portal::storage::{BlobStore, BlobStream};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
pub const LEAD_RECIPIENT: &str = "sales@example.com";
#[allow(dead_code)]
pub const SITE_URL: &str = "https://portal.example.com/";

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

type PutHook = Box<dyn FnOnce() -> Result<()> + Send>;

#[derive(Default)]
pub struct FakeBlobStore {
    blobs: Mutex<HashMap<String, StoredBlob>>,
    after_put: std::sync::Mutex<Option<PutHook>>,
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put_blob(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let mut guard = self.blobs.lock().await;
        guard.insert(
            name.to_string(),
            StoredBlob {
                bytes,
                content_type,
            },
        );
        drop(guard);

        let hook = self
            .after_put
            .lock()
            .map_err(|_| anyhow!("put hook lock poisoned"))?
            .take();
        if let Some(hook) = hook {
            hook()?;
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.blobs.lock().await.contains_key(name))
    }

    async fn open_blob(&self, name: &str) -> Result<BlobStream> {
        let guard = self.blobs.lock().await;
        let blob = guard
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("blob {name} missing"))?;
        let chunk: std::io::Result<Bytes> = Ok(Bytes::from(blob.bytes));
        Ok(Box::pin(futures_util::stream::iter(vec![chunk])))
    }

    async fn delete_blob(&self, name: &str) -> Result<()> {
        self.blobs.lock().await.remove(name);
        Ok(())
    }
}

impl FakeBlobStore {
    #[allow(dead_code)]
    pub async fn names(&self) -> Vec<String> {
        self.blobs.lock().await.keys().cloned().collect()
    }

    #[allow(dead_code)]
    pub async fn remove(&self, name: &str) {
        self.blobs.lock().await.remove(name);
    }

    /// Runs `hook` once, right after the next blob is stored.
    #[allow(dead_code)]
    pub fn after_next_put(&self, hook: impl FnOnce() -> Result<()> + Send + 'static) {
        if let Ok(mut slot) = self.after_put.lock() {
            *slot = Some(Box::new(hook));
        }
    }
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: AtomicBool,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Rejected {
                status: 503,
                body: "mail provider unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

impl FakeMailer {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }

    #[allow(dead_code)]
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Waits for a message to `to`; some emails are sent from detached tasks.
    #[allow(dead_code)]
    pub async fn wait_for(&self, to: &str) -> Result<OutgoingEmail> {
        for _ in 0..50 {
            if let Some(email) = self
                .sent
                .lock()
                .await
                .iter()
                .rev()
                .find(|email| email.to == to)
            {
                return Ok(email.clone());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Err(anyhow!("no email sent to {to}"))
    }
}

/// Canned language model. Replies are served in order; once exhausted it
/// answers with a fixed text.
#[derive(Default)]
pub struct FakeLlm {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fail: AtomicBool,
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().await.push(request);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::Api {
                status: 500,
                message: "model overloaded".to_string(),
            });
        }
        Ok(self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "Fake reply".to_string()))
    }
}

impl FakeLlm {
    #[allow(dead_code)]
    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(reply.into());
    }

    #[allow(dead_code)]
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    #[allow(dead_code)]
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[allow(dead_code)]
pub struct UploadForm<'a> {
    pub user_id: Option<Uuid>,
    pub title: &'a str,
    pub kind: &'a str,
    pub file: Option<(&'a str, &'a [u8])>,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeBlobStore>,
    mailer: Arc<FakeMailer>,
    llm: Arc<FakeLlm>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            password_reset_expiry_minutes: 60,
            public_site_url: SITE_URL.to_string(),
            cors_allowed_origin: None,
            max_upload_bytes: 1024 * 1024,
            storage_backend: StorageBackend::Local,
            upload_dir: PathBuf::from("unused"),
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: None,
            mail_from: "Portal <no-reply@example.com>".to_string(),
            resend_api_key: None,
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            lead_email_to: Some(LEAD_RECIPIENT.to_string()),
            openai_api_key: None,
            openai_base_url: "http://fake-llm.invalid/v1".to_string(),
            chat_model: "chat-test".to_string(),
            summary_model: "summary-test".to_string(),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeBlobStore::default());
        let mailer = Arc::new(FakeMailer::default());
        let llm = Arc::new(FakeLlm::default());
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            storage.clone(),
            mailer.clone(),
            llm.clone(),
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            mailer,
            llm,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeBlobStore> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> Arc<FakeMailer> {
        self.mailer.clone()
    }

    #[allow(dead_code)]
    pub fn llm(&self) -> Arc<FakeLlm> {
        self.llm.clone()
    }

    pub async fn insert_user(&self, email: &str, password: &str, is_admin: bool) -> Result<Uuid> {
        let email = email.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                company_name: format!("{email} Ltd"),
                email,
                password_hash: password::hash_password(&password)?,
                tax_id: None,
                is_admin,
            };
            diesel::insert_into(portal::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/login", &LoginPayload { email, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = read_json(response).await?;
        body["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response has no token"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        self.dispatch(request).await
    }

    #[allow(dead_code)]
    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        self.dispatch(request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        self.dispatch(request).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        self.dispatch(request).await
    }

    #[allow(dead_code)]
    pub async fn upload_document(
        &self,
        form: UploadForm<'_>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();

        if let Some((filename, data)) = form.file {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                    filename
                )
                .as_bytes(),
            );
            body.extend(b"Content-Type: application/pdf\r\n\r\n");
            body.extend(data);
            body.extend(b"\r\n");
        }

        let user_id = form.user_id.map(|id| id.to_string());
        let text_fields = [
            ("userId", user_id.as_deref()),
            ("title", Some(form.title)),
            ("type", Some(form.kind)),
        ];
        for (name, value) in text_fields {
            if let Some(value) = value {
                body.extend(format!("--{boundary}\r\n").as_bytes());
                body.extend(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend(value.as_bytes());
                body.extend(b"\r\n");
            }
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/admin/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json(response: hyper::Response<Body>) -> Result<Value> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).context("response body is not JSON")
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("TRUNCATE TABLE documents, services, leads, users CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}

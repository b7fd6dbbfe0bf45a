use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{ActorGateway, RemoteActor, RemoteRun, RemoteUser, map_remote_status};

// ── Platform response shapes ──

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ListPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct UserBody {
    id: String,
    username: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorBody {
    id: String,
    name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stats: Option<ActorStatsBody>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ActorStatsBody {
    #[serde(default)]
    total_runs: Option<u64>,
    #[serde(default)]
    last_run_started_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorDetailBody {
    #[serde(default)]
    input_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunBody {
    id: String,
    status: String,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    stats: Option<Value>,
}

impl From<ActorBody> for RemoteActor {
    fn from(body: ActorBody) -> Self {
        let stats = body.stats.unwrap_or_default();
        RemoteActor {
            id: body.id,
            name: body.name,
            title: body.title,
            description: body.description,
            total_runs: stats.total_runs.unwrap_or(0),
            last_run_started_at: stats.last_run_started_at,
        }
    }
}

impl From<RunBody> for RemoteRun {
    fn from(body: RunBody) -> Self {
        RemoteRun {
            status: map_remote_status(&body.status),
            id: body.id,
            started_at: body.started_at,
            finished_at: body.finished_at,
            stats: body.stats,
        }
    }
}

// ── Gateway ──

/// REST adapter for the Apify v2 API.
pub struct ApifyGateway {
    base_url: String,
    client: Client,
}

impl ApifyGateway {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build().context("building HTTP client")?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, api_key: &str, path: &str) -> Result<T> {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(api_key)
            .send()
            .await
            .with_context(|| format!("GET {}", path))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("Apify API Error on GET {} ({}): {}", path, status, body));
        }
        res.json::<T>()
            .await
            .with_context(|| format!("decoding GET {}", path))
    }
}

#[async_trait]
impl ActorGateway for ApifyGateway {
    async fn validate_credential(&self, api_key: &str) -> Result<Option<RemoteUser>> {
        let res = self
            .client
            .get(self.url("/users/me"))
            .bearer_auth(api_key)
            .send()
            .await
            .context("GET /users/me")?;
        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("Credential rejected by platform: {}", status);
            return Ok(None);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("Apify API Error on GET /users/me ({}): {}", status, body));
        }
        let body: Envelope<UserBody> = res.json().await.context("decoding /users/me")?;
        Ok(Some(RemoteUser {
            id: body.data.id,
            username: body.data.username,
        }))
    }

    async fn list_actors(&self, api_key: &str) -> Result<Vec<RemoteActor>> {
        let page: Envelope<ListPage<ActorBody>> = self.get_json(api_key, "/acts?my=1").await?;
        Ok(page.data.items.into_iter().map(RemoteActor::from).collect())
    }

    async fn input_schema(&self, api_key: &str, actor_id: &str) -> Result<Value> {
        let detail: Envelope<ActorDetailBody> = self
            .get_json(api_key, &format!("/acts/{}", actor_id))
            .await?;
        Ok(detail
            .data
            .input_schema
            .filter(|schema| !schema.is_null())
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn start_run(&self, api_key: &str, actor_id: &str, inputs: &Value) -> Result<RemoteRun> {
        let path = format!("/acts/{}/runs", actor_id);
        let res = self
            .client
            .post(self.url(&path))
            .bearer_auth(api_key)
            .json(inputs)
            .send()
            .await
            .with_context(|| format!("POST {}", path))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("Apify API Error on POST {} ({}): {}", path, status, body));
        }
        let run: Envelope<RunBody> = res
            .json()
            .await
            .with_context(|| format!("decoding POST {}", path))?;
        Ok(run.data.into())
    }

    async fn run_status(&self, api_key: &str, run_id: &str) -> Result<RemoteRun> {
        let run: Envelope<RunBody> = self
            .get_json(api_key, &format!("/actor-runs/{}", run_id))
            .await?;
        Ok(run.data.into())
    }

    async fn run_results(&self, api_key: &str, run_id: &str) -> Result<Vec<Value>> {
        self.get_json(
            api_key,
            &format!("/actor-runs/{}/dataset/items?format=json&clean=true", run_id),
        )
        .await
    }
}

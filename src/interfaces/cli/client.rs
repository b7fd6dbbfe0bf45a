use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::core::catalog::{Actor, User};
use crate::core::executions::{ExecutionStatus, StatusView};
use crate::core::form::FormField;
use crate::core::poller::StatusSource;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_id: String,
    pub user: User,
    pub actors: Vec<Actor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDescriptor {
    pub actor_id: String,
    pub fields: Vec<FormField>,
    pub empty: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub execution_id: String,
    pub run_id: String,
    pub status: ExecutionStatus,
}

#[derive(Deserialize)]
struct ActorList {
    actors: Vec<Actor>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Talks to a running `actordeck serve` over its JSON API.
#[derive(Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    api_base: String,
    session: Option<String>,
}

impl DashboardClient {
    pub fn new(api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .session
            .as_deref()
            .ok_or_else(|| anyhow!("Not authenticated. Validate an API key first."))?;
        Ok(builder.bearer_auth(token))
    }

    /// Surface the server's `{message}` for any non-2xx answer.
    async fn checked(res: Response) -> Result<Response> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.message)
            .unwrap_or(text);
        bail!("{} ({})", message, status.as_u16())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let res = self
            .authed(self.http.get(self.url(path)))?
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.api_base))?;
        Self::checked(res)
            .await?
            .json()
            .await
            .with_context(|| format!("Malformed response from {}", path))
    }

    pub async fn authenticate(&mut self, api_key: &str) -> Result<LoginResponse> {
        let res = self
            .http
            .post(self.url("/auth/validate"))
            .json(&json!({ "apiKey": api_key }))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.api_base))?;
        let login: LoginResponse = Self::checked(res).await?.json().await?;
        self.session = Some(login.session_id.clone());
        Ok(login)
    }

    pub async fn list_actors(&self) -> Result<Vec<Actor>> {
        let list: ActorList = self.get_json("/actors").await?;
        Ok(list.actors)
    }

    pub async fn select_actor(&self, actor_id: &str) -> Result<()> {
        let res = self
            .authed(
                self.http
                    .post(self.url(&format!("/actors/{}/select", actor_id))),
            )?
            .send()
            .await?;
        Self::checked(res).await?;
        Ok(())
    }

    pub async fn form(&self, actor_id: &str) -> Result<FormDescriptor> {
        self.get_json(&format!("/actors/{}/form", actor_id)).await
    }

    pub async fn execute(
        &self,
        actor_id: &str,
        inputs: &Map<String, Value>,
    ) -> Result<ExecuteResponse> {
        let res = self
            .authed(self.http.post(self.url("/actors/execute")))?
            .json(&json!({ "actorId": actor_id, "inputs": inputs }))
            .send()
            .await?;
        Ok(Self::checked(res).await?.json().await?)
    }

    pub async fn status(&self, execution_id: &str) -> Result<StatusView> {
        self.get_json(&format!("/executions/{}/status", execution_id))
            .await
    }

    /// Raw bytes of the results attachment, ready to be written to disk.
    pub async fn download_results(&self, execution_id: &str) -> Result<Vec<u8>> {
        let res = self
            .authed(
                self.http
                    .get(self.url(&format!("/executions/{}/results", execution_id))),
            )?
            .send()
            .await?;
        Ok(Self::checked(res).await?.bytes().await?.to_vec())
    }
}

#[async_trait]
impl StatusSource for DashboardClient {
    async fn fetch_status(&self, execution_id: &str) -> Result<StatusView> {
        self.status(execution_id).await
    }

    async fn fetch_results(&self, execution_id: &str) -> Result<Vec<Value>> {
        let bytes = self.download_results(execution_id).await?;
        serde_json::from_slice(&bytes).context("Results download is not a JSON array")
    }
}

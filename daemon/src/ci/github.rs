use super::{AccessToken, CheckRunClient, CheckRunUpdate};
use buildfarm_common::config::GithubConfig;
use buildfarm_common::errors::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::time::Duration;

const USER_AGENT: &str = concat!("buildfarm/", env!("CARGO_PKG_VERSION"));

const CREATE_CHECK_RUN: &str = "mutation($input: CreateCheckRunInput!) {
  createCheckRun(input: $input) { checkRun { id } }
}";

const UPDATE_CHECK_RUN: &str = "mutation($input: UpdateCheckRunInput!) {
  updateCheckRun(input: $input) { checkRun { id } }
}";

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckRunPayload {
    check_run: CheckRunNode,
}

#[derive(Debug, Deserialize)]
struct CheckRunNode {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCheckRun {
    create_check_run: CheckRunPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCheckRun {
    update_check_run: CheckRunPayload,
}

// github rejects app tokens that are valid for longer than ten minutes
const APP_TOKEN_LIFETIME: i64 = 9 * 60;
const APP_TOKEN_CLOCK_DRIFT: i64 = 60;

#[derive(Debug, PartialEq, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl AppClaims {
    fn new(app_id: u64, now: DateTime<Utc>) -> AppClaims {
        let now = now.timestamp();
        AppClaims {
            iat: now - APP_TOKEN_CLOCK_DRIFT,
            exp: now + APP_TOKEN_LIFETIME,
            iss: app_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

fn check_run_input(update: &CheckRunUpdate) -> Value {
    let mut input = json!({
        "status": update.status,
        "output": {
            "title": update.title,
            "summary": update.summary,
        },
    });
    if let Some(conclusion) = update.conclusion {
        input["conclusion"] = json!(conclusion);
    }
    if let Some(details_url) = &update.details_url {
        input["detailsUrl"] = json!(details_url);
    }
    input
}

fn load_private_key(config: &GithubConfig) -> Result<EncodingKey> {
    let path = config
        .private_key_file
        .as_ref()
        .ok_or_else(|| format_err!("No GitHub app private key configured"))?;
    let pem = fs::read(path).with_context(|| anyhow!("Failed to read from file: {:?}", path))?;
    EncodingKey::from_rsa_pem(&pem)
        .with_context(|| anyhow!("Failed to load GitHub app private key from {:?}", path))
}

pub struct GithubClient {
    endpoint: String,
    client: HttpClient,
    app_id: u64,
    private_key: EncodingKey,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<GithubClient> {
        let app_id = config
            .app_id
            .ok_or_else(|| format_err!("No GitHub app id configured"))?;
        let private_key = load_private_key(config)?;

        let client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;

        let endpoint = config.api_url().trim_end_matches('/').to_string();
        debug!("Setting GitHub endpoint to {:?}", endpoint);
        Ok(GithubClient {
            endpoint,
            client,
            app_id,
            private_key,
        })
    }

    /// Sign a short-lived token authenticating as the app itself.
    fn app_token(&self) -> Result<String> {
        let claims = AppClaims::new(self.app_id, Utc::now());
        encode(&Header::new(Algorithm::RS256), &claims, &self.private_key)
            .context("Failed to sign GitHub app token")
    }

    fn post(&self, path: &str, bearer: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.endpoint, path))
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(bearer)
    }

    fn graphql<T: DeserializeOwned>(&self, token: &str, query: &str, input: Value) -> Result<T> {
        let response = self
            .post("/graphql", token)
            .json(&json!({
                "query": query,
                "variables": { "input": input },
            }))
            .send()?
            .error_for_status()?
            .json::<GraphQlResponse<T>>()?;

        if !response.errors.is_empty() {
            let messages = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>();
            bail!("GraphQL request failed: {}", messages.join("; "));
        }
        response
            .data
            .ok_or_else(|| format_err!("GraphQL response has no data"))
    }
}

impl CheckRunClient for GithubClient {
    fn access_token(&self, installation_id: u64) -> Result<AccessToken> {
        let path = format!("/app/installations/{}/access_tokens", installation_id);
        let app_token = self.app_token()?;
        let token = self
            .post(&path, &app_token)
            .send()?
            .error_for_status()?
            .json::<InstallationToken>()
            .context("Failed to get installation access token")?;
        Ok(AccessToken {
            token: token.token,
            expires_at: token.expires_at,
        })
    }

    fn create_check_run(
        &self,
        token: &str,
        repository_node_id: &str,
        head_sha: &str,
        name: &str,
        update: &CheckRunUpdate,
    ) -> Result<String> {
        let mut input = check_run_input(update);
        input["repositoryId"] = json!(repository_node_id);
        input["headSha"] = json!(head_sha);
        input["name"] = json!(name);

        let data = self.graphql::<CreateCheckRun>(token, CREATE_CHECK_RUN, input)?;
        Ok(data.create_check_run.check_run.id)
    }

    fn update_check_run(
        &self,
        token: &str,
        repository_node_id: &str,
        node_id: &str,
        update: &CheckRunUpdate,
    ) -> Result<()> {
        let mut input = check_run_input(update);
        input["repositoryId"] = json!(repository_node_id);
        input["checkRunId"] = json!(node_id);

        let data = self.graphql::<UpdateCheckRun>(token, UPDATE_CHECK_RUN, input)?;
        trace!("Updated check run {}", data.update_check_run.check_run.id);
        Ok(())
    }
}

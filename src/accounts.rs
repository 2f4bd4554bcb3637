use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    #[serde(deserialize_with = "utc_or_naive")]
    pub created_at: DateTime<Utc>,
}

// The backend stores naive UTC timestamps and serializes them without an
// offset; accept both that and full RFC 3339.
fn utc_or_naive<'de, D>(de: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(de)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Proof of a successful login. Created only by [`AccountsClient::login`]
/// and consumed by [`AccountsClient::logout`]; hand it to whatever needs to
/// act as the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    access_token: String,
    token_type: String,
}

impl AuthContext {
    pub fn token_type(&self) -> &str {
        &self.token_type
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountsError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("backend rejected request ({status}): {detail}")]
    Rejected { status: StatusCode, detail: String },
    #[error("malformed response body: {0}")]
    Malformed(String),
    #[error("bad endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Clone)]
pub struct AccountsClient {
    client: reqwest::Client,
    base: Url,
}

impl AccountsClient {
    pub fn new(base: Url) -> Self {
        Self { client: reqwest::Client::new(), base }
    }

    pub async fn register(&self, account: &NewAccount) -> Result<Account, AccountsError> {
        let resp = self.client.post(self.base.join("api/users/")?).json(account).send().await?;
        let created: Account = decode(resp).await?;
        tracing::info!(user_id = created.id, "account registered");
        Ok(created)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthContext, AccountsError> {
        let resp = self
            .client
            .post(self.base.join("api/token")?)
            .form(&[("username", email), ("password", password)])
            .send()
            .await?;
        let token: TokenResponse = decode(resp).await?;
        tracing::debug!("login succeeded");
        Ok(AuthContext {
            access_token: token.access_token,
            token_type: token.token_type,
        })
    }

    pub async fn me(&self, auth: &AuthContext) -> Result<Account, AccountsError> {
        let resp = self
            .client
            .get(self.base.join("api/users/me/")?)
            .bearer_auth(&auth.access_token)
            .send()
            .await?;
        decode(resp).await
    }

    /// The backend keeps no server-side session, so dropping the token is
    /// the whole of logging out.
    pub fn logout(&self, auth: AuthContext) {
        drop(auth);
        tracing::debug!("logged out");
    }

    pub async fn status(&self) -> Result<bool, AccountsError> {
        let resp = self.client.get(self.base.join("api/status")?).send().await?;
        let body: StatusBody = decode(resp).await?;
        Ok(body.status == "ok")
    }
}

async fn decode<T>(resp: reqwest::Response) -> Result<T, AccountsError>
where
    T: serde::de::DeserializeOwned,
{
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorBody>(&body)
            .map(|b| match b.detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        return Err(AccountsError::Rejected { status, detail });
    }
    serde_json::from_slice(&body).map_err(|e| AccountsError::Malformed(e.to_string()))
}

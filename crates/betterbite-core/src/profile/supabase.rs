use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProfileStore;
use crate::imaging::{data_uri_bytes, JPEG_MIME};
use crate::session::{Session, SessionUser};
use crate::state::Profile;

const PROFILE_COLUMNS: &str = "tier,scans_remaining,is_paid";
const SCANS_BUCKET: &str = "scans";

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: SessionUser {
                id: token.user.id,
                email: token.user.email,
            },
        }
    }
}

#[derive(Serialize)]
struct ScansUpdate {
    scans_remaining: i32,
}

/// Client for the hosted auth, `profiles` table and `scans` storage bucket
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn profile_url(&self, user_id: &str) -> String {
        format!("{}/rest/v1/profiles?id=eq.{}", self.url, user_id)
    }

    fn object_path(path: &str) -> String {
        format!("{}/{}", SCANS_BUCKET, path.trim_start_matches('/'))
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}", self.url, Self::object_path(path))
    }

    fn authed(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
    }

    async fn token(&self, grant_type: &str, body: &impl Serialize) -> Result<Session> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token?grant_type={}", self.url, grant_type))
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Supabase auth error {}: {}", status, text));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.token("password", &PasswordGrant { email, password }).await
    }

    pub async fn refresh_session(&self, session: &Session) -> Result<Session> {
        self.token(
            "refresh_token",
            &RefreshGrant {
                refresh_token: &session.refresh_token,
            },
        )
        .await
    }

    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .authed(self.client.post(format!("{}/auth/v1/logout", self.url)), session)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Supabase sign-out failed: {}", response.status()));
        }
        Ok(())
    }

    /// Upload a JPEG data URI to the scans bucket and return its public URL
    pub async fn upload_image(&self, session: &Session, encoded: &str, path: &str) -> Result<String> {
        let bytes = data_uri_bytes(encoded)?;
        let url = format!("{}/storage/v1/object/{}", self.url, Self::object_path(path));

        let response = self
            .authed(self.client.post(url), session)
            .header("content-type", JPEG_MIME)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Storage upload failed {}: {}", status, text));
        }

        Ok(self.public_url(path))
    }
}

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn fetch_profile(&self, session: &Session) -> Result<Profile> {
        let url = format!("{}&select={}", self.profile_url(&session.user.id), PROFILE_COLUMNS);

        let response = self
            .authed(self.client.get(url), session)
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Profile fetch failed {}: {}", status, text));
        }

        Ok(response.json().await?)
    }

    async fn update_scans_remaining(&self, session: &Session, expected: i32, new: i32) -> Result<bool> {
        let url = format!(
            "{}&scans_remaining=eq.{}&select={}",
            self.profile_url(&session.user.id),
            expected,
            PROFILE_COLUMNS
        );

        let response = self
            .authed(self.client.patch(url), session)
            .header("Prefer", "return=representation")
            .json(&ScansUpdate { scans_remaining: new })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Profile update failed {}: {}", status, text));
        }

        // An empty representation means the filter matched no row
        let updated: Vec<Profile> = response.json().await?;
        debug!(expected, new, rows = updated.len(), "scans_remaining update");
        Ok(!updated.is_empty())
    }
}

//! Spotify Web API bridge used for account linking and playlist listing.

use crate::{
    config::settings::SpotifyConfig,
    core::music_settings::{set_spotify_user_id, spotify_user_id},
    errors::{Error, Result},
};
use reqwest::{StatusCode, header::RETRY_AFTER};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, instrument};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Playlists listed per user, matching the choice limit of a slash command.
pub const MAX_PLAYLISTS: usize = 25;

/// Tokens are refreshed this long before Spotify would reject them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpotifyProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub tracks: Option<PlaylistTracks>,
}

impl SpotifyPlaylist {
    /// Link handed to the relay, which resolves it as a playlist.
    #[must_use]
    pub fn url(&self) -> String {
        self.external_urls
            .spotify
            .clone()
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", self.id))
    }

    #[must_use]
    pub fn track_count(&self) -> u32 {
        self.tracks.as_ref().map_or(0, |tracks| tracks.total)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaylistTracks {
    pub total: u32,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
}

pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: Option<SpotifyConfig>,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    /// `None` credentials keep the client around but every call fails with
    /// [`Error::SpotifyMisconfigured`].
    #[must_use]
    pub fn new(credentials: Option<SpotifyConfig>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            token: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn access_token(&self) -> Result<String> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(Error::SpotifyMisconfigured)?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting a new Spotify access token");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = check_status(response)?.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{API_URL}{path}"))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    #[instrument(skip(self))]
    pub async fn user_profile(&self, spotify_user_id: &str) -> Result<SpotifyProfile> {
        self.get(&format!("/users/{spotify_user_id}"), &[]).await
    }

    #[instrument(skip(self))]
    pub async fn user_playlists(&self, spotify_user_id: &str) -> Result<Vec<SpotifyPlaylist>> {
        let page: Page<SpotifyPlaylist> = self
            .get(
                &format!("/users/{spotify_user_id}/playlists"),
                &[("limit", MAX_PLAYLISTS.to_string())],
            )
            .await?;
        Ok(page.items.into_iter().take(MAX_PLAYLISTS).collect())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok());
    status_error(response.status(), retry_after).map_or(Ok(response), Err)
}

fn status_error(status: StatusCode, retry_after: Option<u64>) -> Option<Error> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(Error::SpotifyUnauthorized),
        StatusCode::TOO_MANY_REQUESTS => Some(Error::SpotifyRateLimited { retry_after }),
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Some(Error::SpotifyNotFound),
        status if !status.is_success() => Some(Error::InvalidInput {
            message: format!("Spotify answered {status}"),
        }),
        _ => None,
    }
}

/// Accepts a bare user id or an `open.spotify.com/user/...` link.
pub fn parse_user_id(input: &str) -> Result<String> {
    let input = input.trim();
    let id = match input.split_once("open.spotify.com/user/") {
        Some((_, rest)) => rest.split(['?', '/', '#']).next().unwrap_or_default(),
        None => input,
    };

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c)) {
        return Err(Error::InvalidInput {
            message: format!("'{input}' is not a Spotify user id or profile link"),
        });
    }
    Ok(id.to_string())
}

/// Checks the account exists, then stores its id for the user.
pub async fn link_account(
    db: &DatabaseConnection,
    spotify: &SpotifyClient,
    user_id: u64,
    input: &str,
) -> Result<SpotifyProfile> {
    let id = parse_user_id(input)?;
    let profile = spotify.user_profile(&id).await?;
    set_spotify_user_id(db, user_id, Some(profile.id.clone())).await?;
    Ok(profile)
}

/// Forgets the linked account. Returns whether one was linked.
pub async fn unlink_account(db: &DatabaseConnection, user_id: u64) -> Result<bool> {
    let linked = spotify_user_id(db, user_id).await?.is_some();
    if linked {
        set_spotify_user_id(db, user_id, None).await?;
    }
    Ok(linked)
}

/// Playlists of the account linked to `user_id`.
pub async fn linked_playlists(
    db: &DatabaseConnection,
    spotify: &SpotifyClient,
    user_id: u64,
) -> Result<Vec<SpotifyPlaylist>> {
    let Some(id) = spotify_user_id(db, user_id).await? else {
        return Err(Error::SpotifyNotLinked);
    };
    spotify.user_playlists(&id).await
}

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::models::{
    FavoriteChannel, FavoriteChannelOp, FullPlaylist, LikePage, LikedSong, PlaylistStub,
    PlaylistSummary, PlaylistUpsert,
};

const DEFAULT_BASE_URL: &str = "https://music.holodex.net/";

#[derive(Debug, Error)]
pub enum MusicdexError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments: {0}")]
    CannotBeABase(String),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Serialize)]
struct LikeBody<'a> {
    song_id: &'a str,
}

#[derive(Serialize)]
struct StarBody<'a> {
    playlist_id: &'a str,
}

/// Authenticated client for the Musicdex library endpoints.
///
/// Every call maps a non-success status to [`MusicdexError::Api`]; callers decide
/// whether a particular status (usually 404) means "already done".
#[derive(Clone)]
pub struct MusicdexClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl MusicdexClient {
    pub fn new(token: impl Into<String>) -> Result<Self, MusicdexError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, MusicdexError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn list_likes(&self, page: u32) -> Result<LikePage, MusicdexError> {
        let mut url = self.endpoint("/api/v2/musicdex/like")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("paginated", "true");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Walks the paginated like listing until the last page reported by the server.
    pub async fn list_likes_all(&self) -> Result<Vec<LikedSong>, MusicdexError> {
        let mut page = 1u32;
        let mut likes = Vec::new();
        loop {
            let batch = self.list_likes(page).await?;
            likes.extend(batch.content);
            if page >= batch.page_count {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(likes)
    }

    pub async fn add_like(&self, song_id: &str) -> Result<(), MusicdexError> {
        let url = self.endpoint("/api/v2/musicdex/like")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&LikeBody { song_id })
            .send()
            .await?;
        Self::handle_empty(response).await
    }

    pub async fn remove_like(&self, song_id: &str) -> Result<(), MusicdexError> {
        let url = self.endpoint("/api/v2/musicdex/like")?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .json(&LikeBody { song_id })
            .send()
            .await?;
        Self::handle_empty(response).await
    }

    pub async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>, MusicdexError> {
        let url = self.endpoint("/api/v2/musicdex/playlist")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Fetches a playlist with its songs. Synthetic ids such as `:video[id=..]` or
    /// `:history[user_id=..]` are accepted as-is.
    pub async fn get_playlist(&self, playlist_id: &str) -> Result<FullPlaylist, MusicdexError> {
        let url = self.playlist_url(playlist_id)?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_video_playlist(&self, video_id: &str) -> Result<FullPlaylist, MusicdexError> {
        self.get_playlist(&format!(":video[id={video_id}]")).await
    }

    pub async fn get_history_playlist(
        &self,
        user_id: &str,
    ) -> Result<FullPlaylist, MusicdexError> {
        self.get_playlist(&format!(":history[user_id={user_id}]"))
            .await
    }

    /// Creates the playlist when `request.id` is empty, updates it otherwise.
    pub async fn upsert_playlist(
        &self,
        request: &PlaylistUpsert,
    ) -> Result<Vec<PlaylistSummary>, MusicdexError> {
        let url = self.endpoint("/api/v2/musicdex/playlist")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<(), MusicdexError> {
        let url = self.playlist_url(playlist_id)?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_empty(response).await
    }

    pub async fn list_favorite_channels(&self) -> Result<Vec<FavoriteChannel>, MusicdexError> {
        let url = self.endpoint("/api/v2/users/favorites")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn patch_favorite_channels(
        &self,
        ops: &[FavoriteChannelOp],
    ) -> Result<Vec<FavoriteChannel>, MusicdexError> {
        let url = self.endpoint("/api/v2/users/favorites")?;
        let response = self
            .http
            .patch(url)
            .header("Authorization", self.auth_header_value())
            .json(ops)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_starred(&self) -> Result<Vec<PlaylistStub>, MusicdexError> {
        let url = self.endpoint("/api/v2/musicdex/star")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn star_playlist(&self, playlist_id: &str) -> Result<(), MusicdexError> {
        let url = self.endpoint("/api/v2/musicdex/star")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&StarBody { playlist_id })
            .send()
            .await?;
        Self::handle_empty(response).await
    }

    pub async fn unstar_playlist(&self, playlist_id: &str) -> Result<(), MusicdexError> {
        let url = self.endpoint("/api/v2/musicdex/star")?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .json(&StarBody { playlist_id })
            .send()
            .await?;
        Self::handle_empty(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, MusicdexError> {
        Ok(self.base_url.join(path)?)
    }

    fn playlist_url(&self, playlist_id: &str) -> Result<Url, MusicdexError> {
        let mut url = self.endpoint("/api/v2/musicdex/playlist")?;
        url.path_segments_mut()
            .map_err(|_| MusicdexError::CannotBeABase(self.base_url.to_string()))?
            .push(playlist_id);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MusicdexError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn handle_empty(response: reqwest::Response) -> Result<(), MusicdexError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> MusicdexError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        MusicdexError::Api { status, body }
    }
}

impl MusicdexError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            MusicdexError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn classification(&self) -> Option<ApiErrorClass> {
        self.status().map(classify_api_status)
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            MusicdexError::Request(_) => true,
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }

    /// A 404 on a delete-style call means the server no longer has the item.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

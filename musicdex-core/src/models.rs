use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LikedSong {
    pub id: String,
    pub channel_id: String,
    pub video_id: String,
    pub name: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub original_artist: Option<String>,
    #[serde(default)]
    pub art: Option<String>,
}

impl LikedSong {
    /// Local identity of a liked segment: `{video_id}_{start}`.
    pub fn segment_id(&self) -> String {
        format!("{}_{}", self.video_id, self.start)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LikePage {
    pub page_count: u32,
    #[serde(default)]
    pub content: Vec<LikedSong>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PlaylistSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default, rename = "type")]
    pub playlist_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Song {
    pub id: String,
    pub name: String,
    pub video_id: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub original_artist: Option<String>,
    #[serde(default)]
    pub art: Option<String>,
}

impl Song {
    pub fn segment_id(&self) -> String {
        format!("{}_{}", self.video_id, self.start)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FullPlaylist {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub playlist_type: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub content: Option<Vec<Song>>,
}

impl FullPlaylist {
    pub fn songs(&self) -> &[Song] {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Body of the playlist create/update call. An absent `id` creates a new playlist.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistUpsert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub owner: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub playlist_type: String,
    pub content: Vec<String>,
}

impl PlaylistUpsert {
    pub const USER_PLAYLIST_TYPE: &'static str = "ugp";
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FavoriteChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub english_name: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FavoriteChannelOp {
    pub op: PatchOp,
    pub channel_id: String,
}

impl FavoriteChannelOp {
    pub fn add(channel_id: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Add,
            channel_id: channel_id.into(),
        }
    }

    pub fn remove(channel_id: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            channel_id: channel_id.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PlaylistStub {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

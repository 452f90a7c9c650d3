mod client;
mod models;

pub use client::{ApiErrorClass, MusicdexClient, MusicdexError};
pub use models::{
    FavoriteChannel, FavoriteChannelOp, FullPlaylist, LikePage, LikedSong, PatchOp,
    PlaylistStub, PlaylistSummary, PlaylistUpsert, Song,
};

pub mod backoff;
pub mod coordinator;
pub mod favorite_channels;
pub mod history;
pub mod likes;
pub mod logger;
pub mod playlists;
pub mod starred_playlists;
pub mod status;
pub mod store;
pub mod synchronizer;
pub mod timestamp;

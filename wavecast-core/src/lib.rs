pub mod analytics;
pub mod backend;
pub mod error;
pub mod event;
pub mod mechanism;
pub mod playable;
pub mod player;
pub mod playlist;
pub mod scheme;
pub mod settings;
pub mod sponsor;

pub mod audio;
pub mod config;
pub mod controller;
pub mod equalizer;
pub mod error;
pub mod library;
pub mod lyrics;
pub mod lyrics_service;
pub mod model;
pub mod notify;
pub mod playback;
pub mod remote;
pub mod repository;
pub mod sleep_timer;
pub mod store;

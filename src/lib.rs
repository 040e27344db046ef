pub mod api;
pub mod boss_quests;
pub mod boss_summary;
pub mod bot;
pub mod clan_logs;
pub mod commands;
pub mod config;
pub mod db;
pub mod discord;
pub mod error;
pub mod http;
pub mod metrics;
pub mod outbox;
pub mod retry;
pub mod roster;
pub mod scheduler;

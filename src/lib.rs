//! Tribunal: abuse reports and the moderation workflow for a forum.
//!
//! Users file reports against posts, comments, users or communities.
//! Moderators work a severity-ordered queue and resolve each report once,
//! with every decision recorded in an append-only action log.

pub mod action_log;
pub mod config;
pub mod database;
pub mod directory;
pub mod error;
pub mod health;
pub mod models;
pub mod pagination;
pub mod reports;
pub mod service;
pub mod web;
pub mod workflow;

//! DoIt Analysis Backend
//!
//! This library provides the core functionality for the doit-analysis
//! system: a trigger-driven, at-least-once job pipeline that turns
//! ephemeral screen captures and weekly usage data into structured
//! judgments via the Gemini API, deleting the raw evidence once a
//! judgment is produced.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod pipelines;
pub mod routes;
pub mod services;

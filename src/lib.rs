//! Cloud Key Bot Library
//!
//! A Telegram bot for managing per-user cloud provider API keys.
//!
//! This crate provides the core functionality for:
//! - Storing named DigitalOcean and Paperspace keys per user
//! - Migrating older key records to the current format
//! - Persisting records to a JSON file or PostgreSQL
//! - Handling key-management commands via chat messages

pub mod commands;
pub mod config;
pub mod storage;
pub mod telegram;

//! auto-alert - Car listing alerts for a classifieds marketplace.
//!
//! This crate provides:
//! - A bounded-concurrency scraper that syncs saved searches against the marketplace
//! - Change detection of new and price-changed listings
//! - A notification dispatcher pushing pending listings to Telegram

pub mod cache;
pub mod config;
pub mod delivery;
pub mod entity;
pub mod error;
pub mod logging;
pub mod marketplace;
pub mod repository;
pub mod service;
pub mod task;

#![doc = "pleiades-reporter-core: core logic library for pleiades-reporter."]

//! This crate contains the reporters that poll Pleiades and Zotero, the
//! queued channels that post to the Fediverse, and the scheduling loop that
//! ties them together. The command-line glue lives in `pleiades-reporter`.
//!
//! # Usage
//! Add this as a dependency for anything that needs to check upstream sources
//! for new records or to post reports to a channel.

pub mod channel;
pub mod commands;
pub mod config;
pub mod contract;
pub mod dates;
pub mod go_to_social;
pub mod looper;
pub mod pleiades;
pub mod post;
pub mod report;
pub mod reporter;
pub mod rss;
pub mod schedule;
pub mod selection;
pub mod state;
pub mod text;
pub mod web;
pub mod zotero;

/// User agent sent with every upstream request unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = "PleiadesReporter/0.1 (+https://pleiades.stoa.org)";
/// Value of the `From` header sent with every upstream request unless configured otherwise.
pub const DEFAULT_FROM: &str = "pleiades.admin@nyu.edu";

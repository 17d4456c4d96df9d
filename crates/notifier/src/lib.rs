//! Live event reconciliation for the Lodestone dashboard.
//!
//! Raw core events flow through [`source`] into a [`center::NotificationCenter`],
//! which classifies them and folds them into discrete notifications and
//! ongoing progress, then fans live events out to side effects.

pub mod api;
pub mod center;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod notifications;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod subscribers;

//! Adloom - campaign briefs to published social content
//!
//! Users describe a product in a campaign brief. Adloom matches the brief
//! against a library of prompt templates, generates copy, images and video
//! with external AI providers, hosts the media, and publishes to social
//! platforms through each user's OAuth connections. Generation is metered
//! by credits that Stripe subscriptions replenish.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod platforms;
pub mod providers;
pub mod services;

#[cfg(test)]
mod test_support;

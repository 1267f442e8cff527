//! Itinerary planning backend: a proxy for the mapping provider and the
//! itinerary generator, plus the pipeline that turns a chat prompt into
//! markers, a multi-stop route and turn-by-turn directions.

pub mod admin;
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod directions;
pub mod error;
pub mod extraction;
pub mod itinerary;
pub mod mappls;
pub mod normalize;
pub mod place_cache;
pub mod planner;
pub mod presentation;
pub mod resolver;

pub mod api;
pub mod audit;
pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod filter;
pub mod graph;
pub mod path;
pub mod pricing;
pub mod promo;
pub mod types;

// lib.rs
pub mod config;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod hit;
pub mod integrity;
pub mod mate_index;
pub mod pair_window;
pub mod pipeline;
pub mod policy;
pub mod stats;
pub mod tsv;
pub mod window;

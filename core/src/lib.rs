//! Customer value scoring: BG/NBD + Gamma-Gamma lifetime value and
//! RFM segmentation over a static batch of customer order histories.

pub mod action;
pub mod bgnbd;
pub mod cltv;
pub mod config;
pub mod customer;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod event;
pub mod gamma_gamma;
pub mod metrics;
pub mod optimize;
pub mod outlier;
pub mod population;
pub mod rfm;
pub mod rng;
pub mod special;
pub mod stats;
pub mod store;
pub mod types;

// src/lib.rs
pub mod error;
pub mod event;
pub mod config;
pub mod counters;
pub mod engine;
pub mod pipeline;

pub mod stages {
    pub mod stage;
    pub mod event_id;
    pub mod leptons;
    pub mod jets;
    pub mod btag_lr;
    pub mod wtag;
    pub mod category;
    pub mod gen_level;
    pub mod truth_match;
    pub mod top_match;
    pub mod mem;
}

pub use error::{Error, Result};

// The Blue Report: trending links on Bluesky
//
// This is the library root. Each module corresponds to a stage of the
// pipeline (intake, normalization, aggregation, publishing) or to one of
// the stores and services those stages share.

pub mod aggregation;
pub mod bluesky;
pub mod cache;
pub mod card;
pub mod config;
pub mod db;
pub mod format;
pub mod hash;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod ratelimit;
pub mod rendering;
pub mod snapshot;
pub mod storage;
pub mod stream;
pub mod urls;

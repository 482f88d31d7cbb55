//! Salin - Machine Translation Evaluation Harness
//!
//! Splits a Tagalog-English parallel corpus into train/valid/test subsets,
//! obtains predictions for the test subset from neural and hosted translation
//! providers, and scores them with BLEU and COMET.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod report;
pub mod scoring;
pub mod split;
pub mod translate;
pub mod workflow;

#![doc = "explorer-uploader-core: core logic library for mmspd-explorer-uploader."]

//! This crate contains everything needed to turn the output directories of the
//! score computer into objects in the graph explorer bucket, except the storage
//! client itself. The CLI crate supplies an [`contract::ObjectStore`] backed by S3;
//! tests supply mocks or in-memory stores.
//!
//! # Usage
//! Build a [`synchronise::SynchroniseConfig`], wrap a store in an `Arc`, and drive
//! [`synchronise::Synchroniser::run`] (or `run_once` for a single pass).

pub mod archive;
pub mod catalog;
pub mod contract;
pub mod keys;
pub mod manifest;
pub mod pool;
pub mod synchronise;
pub mod timestamp;

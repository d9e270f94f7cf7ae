//! Yardcam Server Library
//!
//! Capture pipeline for yard inspections: maps the on-screen guide frame to
//! raw image pixels, crops, runs recognition providers in parallel and stores
//! the resulting photos idempotently per subject and location.
//!
//! # Modules
//!
//! - `capture`: Frame mapping, the capture session state machine and the pipeline
//! - `recognition`: Provider fan-out, OCR correction and color classification
//! - `photos`: Location labels and the idempotent photo store
//! - `storage`: Blob backends (local filesystem, S3-compatible)
//! - `db`: SQLite photo index

pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod photos;
pub mod recognition;
pub mod routes;
pub mod state;
pub mod storage;

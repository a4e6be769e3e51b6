//! DICOM study uploader library.
//!
//! This library provides the client-side upload orchestration for imaging
//! studies: file intake, the upload session state machine, the HTTP transport
//! and the event stream consumed by a presentation layer.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

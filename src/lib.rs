pub mod annotation;
pub mod batch;
pub mod config;
pub mod convention;
pub mod domain;
pub mod download;
pub mod error;
pub mod executor;
pub mod fs_util;
pub mod identity;
pub mod masking;
pub mod output;
pub mod tools;
pub mod workspace;

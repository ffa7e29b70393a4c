//! Library crate for smart-quiz-back, exposing modules for binaries and tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod generator;
pub mod routes;
pub mod services;
pub mod state;

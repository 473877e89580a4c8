//! Event processing engine for rocket telemetry.
//!
//! Telemetry arrives at least once and in any order. This crate stores it,
//! drains it with a pool of workers, and folds it into per-rocket state so
//! that duplicates and stale events never corrupt that state.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `rockets-config.yaml` into
//!   strongly-typed structs, with environment overrides.
//! - [`reducer`] -- Decoding of event payloads and the pure state transition.
//! - [`processor`] -- [`EventProcessor`]: ordering guard, reduce, conditional
//!   write, and status bookkeeping for one record.
//! - [`dispatcher`] -- [`Dispatcher`]: the start/stop worker pool.
//! - [`service`] -- [`RocketService`]: ingestion and queries.
//!
//! [`EventProcessor`]: processor::EventProcessor
//! [`Dispatcher`]: dispatcher::Dispatcher
//! [`RocketService`]: service::RocketService

pub mod config;
pub mod dispatcher;
pub mod processor;
pub mod reducer;
pub mod service;

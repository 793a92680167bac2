//! Core library for the advance360 service: a configurable multi-phase
//! decision pipeline that segments telecom subscribers, classifies them into
//! credit-advance service offers, scores bad-debt risk, and exposes the
//! results as reporting views.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;

// SPDX-License-Identifier: Apache-2.0

pub mod agent;
pub mod args;
pub mod config;
pub mod kafka_exporter;
mod parse;
pub mod wait;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

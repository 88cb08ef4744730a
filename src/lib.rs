//! fleetrun: on-device test orchestration for Android device fleets.
//!
//! This crate discovers attached or emulated devices over `adb`, matches
//! them against per-ABI capability requirements, pushes built artifacts to
//! each matched device, runs named remote shell tests concurrently, and
//! aggregates pass/fail outcomes into a single verdict.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Channel**: one-shot external command execution against a device
//!   ([`channel::AdbChannel`])
//! - **Device / Fleet**: discovery and lazy capability resolution
//!   ([`device::Device`], [`fleet::Fleet`])
//! - **Orchestrator**: concurrent per-ABI test campaigns and result
//!   aggregation ([`orchestrator::Orchestrator`])
//! - **Config**: TOML run plans with per-ABI token expansion
//!   ([`config::ConfigPlan`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fleetrun::channel::AdbChannel;
//! use fleetrun::config::{ConfigPlan, load_config};
//! use fleetrun::fleet::Fleet;
//! use fleetrun::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("fleetrun.toml"))?;
//!
//!     let orchestrator =
//!         Orchestrator::new(config.project.name.clone(), config.project.min_sdk_version)
//!             .with_base_dir(config.project.base_dir.clone());
//!     let fleet = Fleet::new(Arc::new(AdbChannel::new()));
//!     let plan = ConfigPlan::new(config);
//!
//!     let report = orchestrator.run(&fleet, &plan).await?;
//!     println!("{} tests passed", report.results.len());
//!     Ok(())
//! }
//! ```

pub mod abi;
pub mod channel;
pub mod config;
pub mod device;
pub mod fleet;
pub mod orchestrator;

// Re-export commonly used types
pub use abi::Abi;
pub use channel::{AdbChannel, CommandChannel, RemoteCommandError};
pub use config::{Config, ConfigPlan, load_config, load_config_str};
pub use device::Device;
pub use fleet::Fleet;
pub use orchestrator::{
    Orchestrator, PlanContext, PushSpec, RunError, RunReport, ShellTestSpec, TestPlan, TestResult,
};

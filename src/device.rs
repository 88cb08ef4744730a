//! A single discovered execution target.
//!
//! A [`Device`] is identified by its serial and exposes push/shell
//! operations scoped to that serial. Its capability state (supported ABIs
//! and platform version) is resolved lazily from device properties on first
//! access and then memoized for the rest of the run: a run is short, and
//! re-querying a device that changes state mid-run is not worth the extra
//! round trips. The memoization is guarded, so concurrent first access from
//! several campaigns issues each property query sequence at most once.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::abi::Abi;
use crate::channel::{ChannelResult, CommandChannel};

/// Properties consulted for the supported-ABI set, in query order.
const ABI_PROPERTIES: [&str; 3] = [
    "ro.product.cpu.abi",
    "ro.product.cpu.abi2",
    "ro.product.cpu.abilist",
];

/// Property holding the device's platform SDK version.
const SDK_PROPERTY: &str = "ro.build.version.sdk";

/// One physical or emulated device reachable through the command channel.
pub struct Device {
    serial: String,
    channel: Arc<dyn CommandChannel>,
    abis: OnceCell<Vec<Abi>>,
    version: OnceCell<u32>,
}

impl Device {
    pub(crate) fn new(serial: impl Into<String>, channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            serial: serial.into(),
            channel,
            abis: OnceCell::new(),
            version: OnceCell::new(),
        }
    }

    /// The serial this device was discovered under.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// The set of ABIs this device can execute, sorted and deduplicated.
    ///
    /// Unions the primary ABI, secondary ABI, and ABI list properties,
    /// splitting comma-delimited values and ignoring labels the fixed ABI
    /// table doesn't know. A property query that fails contributes nothing;
    /// partial telemetry must not abort capability discovery. The result is
    /// computed once and cached for the device's lifetime.
    pub async fn abis(&self) -> &[Abi] {
        self.abis.get_or_init(|| self.query_abis()).await
    }

    /// The device's platform version, or `0` when the property is missing
    /// or non-numeric. Cached like [`abis`](Self::abis); a version of `0`
    /// is incompatible with everything non-trivial.
    pub async fn version(&self) -> u32 {
        *self.version.get_or_init(|| self.query_version()).await
    }

    /// Whether this device can run tests for `abi` at `min_version`.
    pub async fn compatible_with(&self, abi: Abi, min_version: u32) -> bool {
        self.abis().await.contains(&abi) && min_version <= self.version().await
    }

    /// Pushes a local file to a path on this device.
    pub async fn push(&self, src: &Path, dest: &str) -> ChannelResult<()> {
        self.run(vec![
            "push".to_string(),
            src.display().to_string(),
            dest.to_string(),
        ])
        .await?;
        Ok(())
    }

    /// Runs a shell command on this device and returns its merged output.
    pub async fn shell<I, S>(&self, cmd: I) -> ChannelResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec!["shell".to_string()];
        args.extend(cmd.into_iter().map(Into::into));
        self.run(args).await
    }

    async fn query_abis(&self) -> Vec<Abi> {
        let mut abis = BTreeSet::new();
        for property in ABI_PROPERTIES {
            let value = match self.getprop(property).await {
                Ok(value) => value,
                Err(err) => {
                    debug!(serial = %self.serial, property, %err, "abi property query failed");
                    continue;
                }
            };
            for label in value.trim().split(',') {
                if let Some(abi) = Abi::from_abi_name(label.trim()) {
                    abis.insert(abi);
                }
            }
        }
        abis.into_iter().collect()
    }

    async fn query_version(&self) -> u32 {
        match self.getprop(SDK_PROPERTY).await {
            Ok(value) => value.trim().parse().unwrap_or(0),
            Err(err) => {
                debug!(serial = %self.serial, %err, "version property query failed");
                0
            }
        }
    }

    async fn getprop(&self, name: &str) -> ChannelResult<String> {
        self.shell(["getprop", name]).await
    }

    async fn run(&self, args: Vec<String>) -> ChannelResult<String> {
        self.channel.execute(&args, Some(&self.serial)).await
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

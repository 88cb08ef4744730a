//! Device fleet discovery and capability matching.
//!
//! A [`Fleet`] issues one discovery query per orchestration run, lazily,
//! and answers "which device can satisfy requirement X" queries against
//! that snapshot. Discovery failure degrades to an empty fleet rather than
//! aborting the run; the per-ABI campaigns then report unmatched ABIs as
//! warnings.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::warn;

use crate::abi::Abi;
use crate::channel::CommandChannel;
use crate::device::Device;

const DISCOVERY_HEADER: &str = "List of devices attached";
const DAEMON_BANNER: &str = "* daemon";

/// The ordered set of devices discovered in one orchestration run.
pub struct Fleet {
    channel: Arc<dyn CommandChannel>,
    devices: OnceCell<Vec<Device>>,
}

impl Fleet {
    /// Creates a fleet over the given channel. Discovery is deferred until
    /// the first [`devices`](Self::devices) call.
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            channel,
            devices: OnceCell::new(),
        }
    }

    /// The discovered devices, in discovery order.
    ///
    /// Issues one `devices` query on first access and caches the result for
    /// the fleet's lifetime. When the query itself fails, the fleet degrades
    /// to empty with a warning instead of failing the run.
    pub async fn devices(&self) -> &[Device] {
        self.devices
            .get_or_init(|| async {
                match self.channel.execute(&["devices".to_string()], None).await {
                    Ok(output) => parse_device_list(&output)
                        .into_iter()
                        .map(|serial| Device::new(serial, Arc::clone(&self.channel)))
                        .collect(),
                    Err(err) => {
                        warn!(%err, "device discovery failed; continuing with an empty fleet");
                        Vec::new()
                    }
                }
            })
            .await
    }

    /// Returns the first device in discovery order that can run tests for
    /// `abi` at `min_version`, or `None` when no device qualifies.
    ///
    /// This is a lookup, not a reservation: repeated calls (including
    /// concurrent ones from different campaigns) may return the same
    /// device. Whether the underlying transport tolerates concurrent
    /// traffic against one device is an external assumption; adb serializes
    /// per-transport traffic well enough for short runs, and this mirrors
    /// the behavior the engine has always had.
    pub async fn find_device_for(&self, abi: Abi, min_version: u32) -> Option<&Device> {
        for device in self.devices().await {
            if device.compatible_with(abi, min_version).await {
                return Some(device);
            }
        }
        None
    }
}

fn usable_device_line(line: &str) -> bool {
    if line.trim().is_empty() {
        return false;
    }
    if line == DISCOVERY_HEADER {
        return false;
    }
    if line.contains("offline") || line.contains("unauthorized") {
        return false;
    }
    if line.starts_with(DAEMON_BANNER) {
        return false;
    }
    true
}

/// Extracts device serials from discovery output: one serial per usable
/// line, taken from the line's first whitespace-delimited token.
fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| usable_device_line(line))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fake::ScriptedChannel;

    #[test]
    fn parse_filters_header_blank_offline_unauthorized_and_banner() {
        let output = "List of devices attached\n\
                      ABC123\tdevice\n\
                      DEF456\toffline\n\
                      GHI789\tunauthorized\n\
                      * daemon not running; starting now at tcp:5037\n\
                      \n\
                      JKL012 device usb:1-1\n";
        assert_eq!(parse_device_list(output), vec!["ABC123", "JKL012"]);
    }

    #[test]
    fn parse_keeps_exactly_the_usable_line() {
        let output = "List of devices attached\nABC123\tdevice\nDEF456\toffline\n";
        assert_eq!(parse_device_list(output), vec!["ABC123"]);
    }

    #[tokio::test]
    async fn discovery_failure_yields_empty_fleet() {
        let channel = Arc::new(ScriptedChannel::new().fail(None, "devices", "cannot connect"));
        let fleet = Fleet::new(channel);
        assert!(fleet.devices().await.is_empty());
    }

    #[tokio::test]
    async fn discovery_runs_once_and_is_cached() {
        let channel = Arc::new(ScriptedChannel::new().respond(
            None,
            "devices",
            "List of devices attached\nABC123\tdevice\n",
        ));
        let fleet = Fleet::new(channel.clone());

        assert_eq!(fleet.devices().await.len(), 1);
        assert_eq!(fleet.devices().await.len(), 1);
        assert_eq!(channel.call_count(None, "devices"), 1);
    }

    #[tokio::test]
    async fn find_device_for_returns_first_match_in_discovery_order() {
        let channel = Arc::new(
            ScriptedChannel::new()
                .respond(
                    None,
                    "devices",
                    "List of devices attached\nFIRST\tdevice\nSECOND\tdevice\n",
                )
                .respond(Some("FIRST"), "shell getprop ro.product.cpu.abilist", "x86_64\n")
                .respond(Some("FIRST"), "shell getprop ro.build.version.sdk", "23\n")
                .respond(Some("SECOND"), "shell getprop ro.product.cpu.abilist", "x86_64\n")
                .respond(Some("SECOND"), "shell getprop ro.build.version.sdk", "30\n"),
        );
        let fleet = Fleet::new(channel);

        let device = fleet.find_device_for(Abi::X86_64, 21).await.unwrap();
        assert_eq!(device.serial(), "FIRST");

        // The first device is too old for 24; the scan moves on.
        let device = fleet.find_device_for(Abi::X86_64, 24).await.unwrap();
        assert_eq!(device.serial(), "SECOND");

        assert!(fleet.find_device_for(Abi::Armv7, 21).await.is_none());
    }

    #[tokio::test]
    async fn find_device_for_is_none_on_empty_fleet() {
        let channel = Arc::new(ScriptedChannel::new().respond(
            None,
            "devices",
            "List of devices attached\n",
        ));
        let fleet = Fleet::new(channel);
        assert!(fleet.find_device_for(Abi::Arm64, 21).await.is_none());
    }
}

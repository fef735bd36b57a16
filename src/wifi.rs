//! Wireless interface discovery and network scanning via `iw` / `iwlist`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;

use crate::error::{CommandError, WifiScanError};

static ESSID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"ESSID:"([^"]+)""#).expect("valid regex"));
static QUALITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Quality=([^ ]+) ").expect("valid regex"));
static SIGNAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Signal level=(-?\d+)").expect("valid regex"));
static ADDRESS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Address: ([\w:]+)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub ssid: String,
    pub quality: Option<String>,
    pub signal_level: Option<i32>,
    pub bssid: String,
}

pub struct WifiScanner {
    use_sudo: bool,
}

impl WifiScanner {
    pub fn new(use_sudo: bool) -> Self {
        WifiScanner { use_sudo }
    }

    /// Scans on the first wireless interface and returns one entry per SSID.
    pub async fn scan_networks(&self) -> Result<Vec<Network>, WifiScanError> {
        let output = run("iw", &["dev"])
            .await
            .map_err(WifiScanError::Interfaces)?;
        let interfaces = parse_interfaces(&output);
        let Some(interface) = interfaces.first() else {
            return Err(WifiScanError::NoInterfaces);
        };

        let output = if self.use_sudo {
            run("sudo", &["iwlist", interface.as_str(), "scanning"]).await
        } else {
            run("iwlist", &[interface.as_str(), "scanning"]).await
        }
        .map_err(|source| WifiScanError::Scan {
            interface: interface.clone(),
            source,
        })?;

        Ok(dedup_strongest(parse_scan(&output)))
    }
}

async fn run(program: &str, args: &[&str]) -> Result<String, CommandError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program.to_owned(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        log::error!("{program} failed with {}: {stderr}", output.status);
        return Err(CommandError::Failed {
            program: program.to_owned(),
            status: output.status,
            stderr,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Interface names from `iw dev` output.
pub fn parse_interfaces(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains("Interface"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_owned)
        .collect()
}

/// Networks from `iwlist <iface> scanning` output. Cells missing an SSID or
/// BSSID are dropped.
pub fn parse_scan(output: &str) -> Vec<Network> {
    output
        .split("Cell")
        .skip(1)
        .filter_map(|cell| {
            let capture = |re: &Regex| re.captures(cell).map(|caps| caps[1].to_owned());
            Some(Network {
                ssid: capture(&ESSID)?,
                quality: capture(&QUALITY),
                signal_level: capture(&SIGNAL).and_then(|level| level.parse().ok()),
                bssid: capture(&ADDRESS)?,
            })
        })
        .collect()
}

/// Keeps one network per SSID at the position it was first seen, replaced only
/// by a strictly stronger signal when both levels are known.
pub fn dedup_strongest(networks: Vec<Network>) -> Vec<Network> {
    let mut unique: Vec<Network> = Vec::with_capacity(networks.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for network in networks {
        match index.get(&network.ssid) {
            Some(&at) => {
                let stronger = matches!(
                    (unique[at].signal_level, network.signal_level),
                    (Some(existing), Some(candidate)) if candidate > existing
                );
                if stronger {
                    unique[at] = network;
                }
            }
            None => {
                index.insert(network.ssid.clone(), unique.len());
                unique.push(network);
            }
        }
    }
    unique
}

//! System properties snapshot.
//!
//! Reports process and platform facts for diagnostics pages. Environment
//! variables are left out: they routinely hold credentials.

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::{extract::State, Json};
use serde::Serialize;
use sysinfo::{Networks, ProcessesToUpdate, System};

use crate::state::AppState;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Serialize)]
pub struct SystemSnapshot {
    pub captured_at: String,
    pub process: ProcessInfo,
    pub os: OsInfo,
    pub versions: Versions,
}

#[derive(Debug, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub argv: Vec<String>,
    pub exec_path: Option<String>,
    pub cwd: Option<String>,
    pub memory_usage: Option<MemoryUsage>,
    pub uptime_s: u64,
}

/// Memory of this process, in bytes
#[derive(Debug, Serialize)]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_memory: u64,
}

#[derive(Debug, Serialize)]
pub struct OsInfo {
    pub platform: &'static str,
    pub family: &'static str,
    #[serde(rename = "type")]
    pub os_type: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub arch: &'static str,
    pub cpus: Vec<CpuInfo>,
    pub total_memory_mb: u64,
    pub free_memory_mb: u64,
    pub hostname: Option<String>,
    pub homedir: Option<String>,
    pub tmpdir: String,
    pub network_interfaces: BTreeMap<String, NetworkInterface>,
}

#[derive(Debug, Serialize)]
pub struct CpuInfo {
    pub model: String,
    /// Current frequency in MHz
    pub speed: u64,
}

#[derive(Debug, Serialize)]
pub struct NetworkInterface {
    pub mac: String,
    /// Addresses in CIDR notation
    pub addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Versions {
    pub server: &'static str,
}

pub async fn system(State(state): State<AppState>) -> Json<SystemSnapshot> {
    Json(collect_snapshot(state.uptime_secs()))
}

/// Gathers the snapshot from the running system.
pub fn collect_snapshot(uptime_s: u64) -> SystemSnapshot {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();

    let memory_usage = sysinfo::get_current_pid().ok().and_then(|pid| {
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).map(|process| MemoryUsage {
            rss: process.memory(),
            virtual_memory: process.virtual_memory(),
        })
    });

    let cpus = sys
        .cpus()
        .iter()
        .map(|cpu| CpuInfo {
            model: cpu.brand().to_string(),
            speed: cpu.frequency(),
        })
        .collect();

    let networks = Networks::new_with_refreshed_list();
    let network_interfaces = networks
        .list()
        .iter()
        .map(|(name, data)| {
            let addresses = data
                .ip_networks()
                .iter()
                .map(|network| format!("{}/{}", network.addr, network.prefix))
                .collect();
            (
                name.clone(),
                NetworkInterface {
                    mac: data.mac_address().to_string(),
                    addresses,
                },
            )
        })
        .collect();

    SystemSnapshot {
        captured_at: chrono::Utc::now().to_rfc3339(),
        process: ProcessInfo {
            pid: std::process::id(),
            argv: std::env::args().collect(),
            exec_path: std::env::current_exe().ok().map(display_path),
            cwd: std::env::current_dir().ok().map(display_path),
            memory_usage,
            uptime_s,
        },
        os: OsInfo {
            platform: std::env::consts::OS,
            family: std::env::consts::FAMILY,
            os_type: System::name(),
            release: System::kernel_version(),
            version: System::os_version(),
            arch: std::env::consts::ARCH,
            cpus,
            total_memory_mb: to_mb(sys.total_memory()),
            free_memory_mb: to_mb(sys.free_memory()),
            hostname: System::host_name(),
            homedir: home_dir().map(display_path),
            tmpdir: display_path(std::env::temp_dir()),
            network_interfaces,
        },
        versions: Versions {
            server: env!("CARGO_PKG_VERSION"),
        },
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

fn display_path(path: PathBuf) -> String {
    path.display().to_string()
}

fn to_mb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mb_rounds() {
        assert_eq!(to_mb(0), 0);
        assert_eq!(to_mb(1024 * 1024), 1);
        assert_eq!(to_mb(1024 * 1024 * 3 / 2), 2);
        assert_eq!(to_mb(1024 * 1024 * 5 / 4), 1);
    }

    #[test]
    fn test_snapshot_describes_this_process() {
        let snapshot = collect_snapshot(7);
        assert_eq!(snapshot.process.pid, std::process::id());
        assert_eq!(snapshot.process.uptime_s, 7);
        assert_eq!(snapshot.os.platform, std::env::consts::OS);
        assert!(!snapshot.os.tmpdir.is_empty());
        assert!(snapshot.os.free_memory_mb <= snapshot.os.total_memory_mb);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_snapshot_reads_linux_host() {
        let snapshot = collect_snapshot(0);
        assert!(snapshot.os.total_memory_mb > 0);
        assert!(!snapshot.os.cpus.is_empty());
        assert!(snapshot.os.release.is_some());
        assert!(snapshot.process.memory_usage.is_some_and(|usage| usage.rss > 0));
    }
}

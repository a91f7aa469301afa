//! Host capability detection for process monitor methods

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{debug, info};
use once_cell::sync::Lazy;

use crate::config::ProcMonitorMethod;
use crate::subsystems::{DownstreamError, DownstreamResult, ProcessMonitor};

static HOST: Lazy<HostCapabilities> = Lazy::new(|| HostCapabilities::probe(&probe_root()));

/// Capabilities of the running host, probed once per process
pub fn host_capabilities() -> &'static HostCapabilities {
    &HOST
}

/// Issue severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

/// Problem found while probing the host
#[derive(Debug, Clone)]
pub struct HostIssue {
    pub message: String,
    pub severity: IssueSeverity,
    /// Suggested resolution
    pub resolution: Option<String>,
}

/// What the kernel and privileges of this host allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Kernel release, when readable
    pub kernel_release: Option<String>,

    /// Effective uid is 0
    pub is_root: bool,

    /// BPF filesystem mounted and kprobes enabled
    pub ebpf: bool,

    /// Audit dispatcher socket present
    pub audit: bool,

    /// Kernel tracer kprobe interface present
    pub ftrace: bool,
}

const BPF_FS: &str = "sys/fs/bpf";
const KPROBES_ENABLED: &str = "sys/kernel/debug/kprobes/enabled";
const AUDISP_SOCKET: &str = "var/run/audispd_events";
const TRACING_DIRS: [&str; 2] = ["sys/kernel/tracing", "sys/kernel/debug/tracing"];

impl HostCapabilities {
    /// Probe the filesystem below `root` (`/` outside tests)
    pub fn probe(root: &Path) -> Self {
        let kernel_release = fs::read_to_string(root.join("proc/sys/kernel/osrelease"))
            .ok()
            .map(|s| s.trim().to_string());
        let is_root = effective_uid(root) == Some(0);

        let kprobes = match fs::read_to_string(root.join(KPROBES_ENABLED)) {
            Ok(flag) => flag.trim() == "1",
            // Not readable without debugfs; fall back to the BPF mount alone
            Err(_) => true,
        };
        let ebpf = is_root && kprobes && root.join(BPF_FS).is_dir();
        let audit = root.join(AUDISP_SOCKET).exists();
        let ftrace = is_root
            && TRACING_DIRS
                .iter()
                .any(|dir| root.join(dir).join("kprobe_events").exists());

        let caps = Self { kernel_release, is_root, ebpf, audit, ftrace };
        debug!("Host capabilities: {:?}", caps);
        caps
    }

    pub fn supports(&self, method: ProcMonitorMethod) -> bool {
        match method {
            ProcMonitorMethod::Proc => true,
            ProcMonitorMethod::Ebpf => self.ebpf,
            ProcMonitorMethod::Audit => self.audit,
            ProcMonitorMethod::Ftrace => self.ftrace,
        }
    }

    /// Methods usable on this host, `proc` first
    pub fn available_methods(&self) -> Vec<ProcMonitorMethod> {
        ProcMonitorMethod::ALL
            .into_iter()
            .filter(|m| self.supports(*m))
            .collect()
    }

    /// Problems an operator may want to fix
    pub fn issues(&self) -> Vec<HostIssue> {
        let mut issues = Vec::new();

        if self.kernel_release.is_none() {
            issues.push(HostIssue {
                message: "procfs does not appear to be mounted: connections cannot be attributed to processes".to_string(),
                severity: IssueSeverity::Error,
                resolution: Some("Mount procfs at /proc".to_string()),
            });
        }

        if !self.is_root {
            issues.push(HostIssue {
                message: "Not running as root: ebpf and ftrace process monitors are unavailable".to_string(),
                severity: IssueSeverity::Warning,
                resolution: Some("Run the daemon as root or with CAP_SYS_ADMIN".to_string()),
            });
        }

        if self.is_root && !self.ebpf {
            issues.push(HostIssue {
                message: "eBPF process monitor is unavailable".to_string(),
                severity: IssueSeverity::Info,
                resolution: Some(format!("Mount the BPF filesystem at /{} and enable kprobes", BPF_FS)),
            });
        }

        if !self.audit {
            issues.push(HostIssue {
                message: "audit process monitor is unavailable".to_string(),
                severity: IssueSeverity::Info,
                resolution: Some(format!("Enable the auditd af_unix plugin (/{})", AUDISP_SOCKET)),
            });
        }

        issues
    }
}

/// Effective uid from `/proc/self/status`
fn effective_uid(root: &Path) -> Option<u32> {
    let status = fs::read_to_string(root.join("proc/self/status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|uids| uids.split_whitespace().nth(1))
        .and_then(|euid| euid.parse().ok())
}

/// Process monitor whose availability answers come from host probing.
///
/// Switching only records the method; the monitoring backends themselves
/// live outside this crate.
#[derive(Debug)]
pub struct HostProcessMonitor {
    capabilities: HostCapabilities,
    current: Mutex<ProcMonitorMethod>,
}

impl HostProcessMonitor {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            current: Mutex::new(ProcMonitorMethod::Proc),
        }
    }

    /// Monitor for the running host
    pub fn detect() -> Self {
        Self::new(host_capabilities().clone())
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }
}

impl ProcessMonitor for HostProcessMonitor {
    fn is_available(&self, method: ProcMonitorMethod) -> bool {
        self.capabilities.supports(method)
    }

    fn set_method(&self, method: ProcMonitorMethod) -> DownstreamResult {
        if !self.capabilities.supports(method) {
            return Err(DownstreamError::new(
                "procmon",
                format!("{} monitor is not available on this host", method),
            ));
        }

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != method {
            info!("Process monitor method: {} -> {}", *current, method);
            *current = method;
        }
        Ok(())
    }

    fn current_method(&self) -> ProcMonitorMethod {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Root directory for [`HostCapabilities::probe`], overridable for diagnostics
pub fn probe_root() -> PathBuf {
    std::env::var_os("POLICYD_HOST_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

//! Machine Profile
//!
//! Describes the host once per invocation: CPU brand, optional vCPU count,
//! RAM and OS as ordered specs, plus a display name and a URL-safe id derived
//! from it.

use progress_report::MachineProfile;
use sysinfo::System;

/// Source of host facts
pub trait MachineProbe {
    /// CPU brand string as reported by the host
    fn cpu_brand(&self) -> String;
    /// Total physical memory in bytes
    fn total_memory_bytes(&self) -> u64;
    /// `"<system name> <kernel version>"`
    fn os(&self) -> String;
    /// Network host name
    fn host_name(&self) -> String;
}

/// [`MachineProbe`] backed by `sysinfo`
pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    /// Query the host
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self { system }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineProbe for SystemProbe {
    fn cpu_brand(&self) -> String {
        self.system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn total_memory_bytes(&self) -> u64 {
        self.system.total_memory()
    }

    fn os(&self) -> String {
        let name = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
        match System::kernel_version() {
            Some(release) => format!("{name} {release}"),
            None => name,
        }
    }

    fn host_name(&self) -> String {
        System::host_name().unwrap_or_else(|| "unknown".to_string())
    }
}

/// User-supplied replacements for probed values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineOverrides {
    /// Display name
    pub name: Option<String>,
    /// OS description
    pub os: Option<String>,
    /// vCPU count; never inferred
    pub vcpu: Option<String>,
}

/// Build the profile from `probe`, preferring `overrides`
pub fn build_profile(probe: &dyn MachineProbe, overrides: &MachineOverrides) -> MachineProfile {
    let mut specs = Vec::with_capacity(4);

    let cpu = probe.cpu_brand().replace("(R)", "®").replace("(TM)", "™");
    specs.push(["CPU".to_string(), cpu]);

    if let Some(vcpu) = &overrides.vcpu {
        specs.push(["vCPU".to_string(), vcpu.clone()]);
    }

    let ram_gb = probe.total_memory_bytes() as f64 / (1024.0 * 1024.0 * 1024.0);
    specs.push(["RAM".to_string(), format!("{ram_gb:.2} GB")]);

    let os = overrides.os.clone().unwrap_or_else(|| probe.os());
    specs.push(["OS".to_string(), os]);

    let name = overrides
        .name
        .clone()
        .unwrap_or_else(|| probe.host_name())
        .trim()
        .to_string();

    MachineProfile {
        id: machine_id(&name),
        name,
        specs,
    }
}

/// Slug for a machine display name.
///
/// Lowercases, turns spaces, underscores and periods into hyphens, drops
/// parentheses, spells out `$/h`, then form-encodes the rest.
pub fn machine_id(name: &str) -> String {
    let slug = name
        .trim()
        .to_lowercase()
        .replace([' ', '_', '.'], "-")
        .replace(['(', ')'], "")
        .replace("$/h", "-dollars-per-hour");
    url::form_urlencoded::byte_serialize(slug.trim().as_bytes()).collect()
}

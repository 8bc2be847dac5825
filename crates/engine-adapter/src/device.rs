//! Snapshot of the host: CPU, memory and platform tags.

use crate::dispatcher::Capacity;
use engine_com::test_flow::{Cpu, Hardware};
use sha2::{Digest, Sha256};
use sysinfo::System;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Hardware description plus the identity the test server knows us by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    /// Hex SHA-256 of the machine id.
    pub id: String,
    pub hardware: Hardware,
}

impl Device {
    /// Inspect the current host.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let (model, vendor) = sys
            .cpus()
            .first()
            .map(|cpu| (cpu.brand().trim().to_string(), cpu.vendor_id().to_string()))
            .unwrap_or_default();

        let cpu = Cpu {
            cores: num_cpus::get_physical(),
            threads: num_cpus::get(),
            model,
            vendor,
            capabilities: cpu_capabilities(),
        };

        let host_name = System::host_name().unwrap_or_default();
        let os_version = System::long_os_version().unwrap_or_default();

        let hardware = Hardware {
            cpu: vec![cpu],
            gpu: Vec::new(),
            memory: sys.total_memory(),
            model: os_version,
            os: os_tag().to_string(),
            arch: arch_tag().to_string(),
        };

        let name = if host_name.is_empty() {
            hardware.model.clone()
        } else {
            host_name.clone()
        };
        let id = device_id(&machine_id().unwrap_or(host_name));

        tracing::debug!(
            "Device {} ({}/{}, {} threads, {} MiB)",
            name,
            hardware.os,
            hardware.arch,
            num_cpus::get(),
            hardware.memory / BYTES_PER_MIB
        );

        Self { name, id, hardware }
    }

    /// Resources available to a batch.
    pub fn capacity(&self) -> Capacity {
        capacity_of(&self.hardware)
    }
}

/// Logical cores and total memory of `hardware`.
pub fn capacity_of(hardware: &Hardware) -> Capacity {
    let cores = hardware
        .cpu
        .iter()
        .map(|cpu| cpu.threads.max(cpu.cores))
        .sum::<usize>()
        .max(1);
    Capacity {
        cores,
        memory_mb: hardware.memory / BYTES_PER_MIB,
    }
}

/// Stable, anonymous identifier derived from `seed`.
pub fn device_id(seed: &str) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

fn machine_id() -> Option<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
}

/// Operating system in the server's vocabulary.
pub fn os_tag() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// CPU architecture in the server's vocabulary.
pub fn arch_tag() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Instruction set extensions engines are commonly built for.
#[cfg(target_arch = "x86_64")]
pub fn cpu_capabilities() -> Vec<String> {
    let detected = [
        ("sse2", std::arch::is_x86_feature_detected!("sse2")),
        ("sse3", std::arch::is_x86_feature_detected!("sse3")),
        ("ssse3", std::arch::is_x86_feature_detected!("ssse3")),
        ("sse4.1", std::arch::is_x86_feature_detected!("sse4.1")),
        ("sse4.2", std::arch::is_x86_feature_detected!("sse4.2")),
        ("popcnt", std::arch::is_x86_feature_detected!("popcnt")),
        ("avx", std::arch::is_x86_feature_detected!("avx")),
        ("avx2", std::arch::is_x86_feature_detected!("avx2")),
        ("bmi1", std::arch::is_x86_feature_detected!("bmi1")),
        ("bmi2", std::arch::is_x86_feature_detected!("bmi2")),
        ("fma", std::arch::is_x86_feature_detected!("fma")),
        ("avx512f", std::arch::is_x86_feature_detected!("avx512f")),
    ];
    detected
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(target_arch = "aarch64")]
pub fn cpu_capabilities() -> Vec<String> {
    let detected = [
        ("neon", std::arch::is_aarch64_feature_detected!("neon")),
        ("dotprod", std::arch::is_aarch64_feature_detected!("dotprod")),
    ];
    detected
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub fn cpu_capabilities() -> Vec<String> {
    Vec::new()
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Device discovery for encoder placement

use std::fmt;
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Where an encoder session executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDevice {
    Cpu,
    Cuda(i32),
}

impl ExecutionDevice {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, ExecutionDevice::Cuda(_))
    }
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionDevice::Cpu => write!(f, "cpu"),
            ExecutionDevice::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("Invalid device ordinal '{0}'")]
    InvalidOrdinal(String),

    #[error("Device list is empty")]
    Empty,
}

/// Requested device placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Every visible CUDA device, or the CPU when none is visible
    Auto,
    Cpu,
    Cuda(Vec<i32>),
}

impl FromStr for DeviceSelection {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("auto") {
            return Ok(DeviceSelection::Auto);
        }
        if value.eq_ignore_ascii_case("cpu") {
            return Ok(DeviceSelection::Cpu);
        }

        let ids = value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let ordinal = part.strip_prefix("cuda:").unwrap_or(part);
                ordinal
                    .parse::<i32>()
                    .ok()
                    .filter(|id| *id >= 0)
                    .ok_or_else(|| DeviceError::InvalidOrdinal(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if ids.is_empty() {
            return Err(DeviceError::Empty);
        }
        Ok(DeviceSelection::Cuda(ids))
    }
}

impl DeviceSelection {
    /// Turns the selection into concrete devices, probing hardware for `Auto`
    pub fn resolve(&self) -> Vec<ExecutionDevice> {
        match self {
            DeviceSelection::Cpu => vec![ExecutionDevice::Cpu],
            DeviceSelection::Cuda(ids) => ids.iter().copied().map(ExecutionDevice::Cuda).collect(),
            DeviceSelection::Auto => {
                let ids = detect_cuda_devices();
                if ids.is_empty() {
                    info!("No CUDA devices detected, using CPU");
                    vec![ExecutionDevice::Cpu]
                } else {
                    info!("Detected {} CUDA device(s)", ids.len());
                    ids.into_iter().map(ExecutionDevice::Cuda).collect()
                }
            }
        }
    }
}

/// Ordinals of the CUDA devices visible to this process
pub fn detect_cuda_devices() -> Vec<i32> {
    if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
        debug!("CUDA_VISIBLE_DEVICES={}", visible);
        return parse_visible_devices(&visible);
    }

    match Command::new("nvidia-smi")
        .arg("--query-gpu=index")
        .arg("--format=csv,noheader")
        .output()
    {
        Ok(output) if output.status.success() => {
            parse_nvidia_smi_indices(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            debug!("nvidia-smi exited with {}", output.status);
            Vec::new()
        }
        Err(e) => {
            debug!("nvidia-smi unavailable: {}", e);
            Vec::new()
        }
    }
}

/// CUDA renumbers visible devices from zero, so only the count of valid
/// leading entries matters. Enumeration stops at the first invalid entry.
pub fn parse_visible_devices(value: &str) -> Vec<i32> {
    let count = value
        .split(',')
        .map(str::trim)
        .take_while(|entry| is_visible_entry(entry))
        .count();
    (0..count as i32).collect()
}

fn is_visible_entry(entry: &str) -> bool {
    if entry.is_empty() {
        return false;
    }
    match entry.parse::<i32>() {
        Ok(id) => id >= 0,
        // UUID-style entries (GPU-xxxx, MIG-xxxx)
        Err(_) => entry.starts_with("GPU-") || entry.starts_with("MIG-"),
    }
}

pub fn parse_nvidia_smi_indices(output: &str) -> Vec<i32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .collect()
}

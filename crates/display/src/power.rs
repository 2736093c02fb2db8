// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Battery telemetry seam.

use serde::{Deserialize, Serialize};

/// One reading from the power sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerStatus {
    pub percent: f64,
    pub voltage: f64,
    pub ac_power: bool,
    pub state: String,
    pub low_battery: bool,
    pub timestamp: String,
}

/// Sensor seam; the UPS HAT driver is an external collaborator.
pub trait PowerTelemetry: Send + Sync {
    /// Latest reading, or None when no sensor is attached.
    fn read_status(&self) -> Option<PowerStatus>;
}

/// Telemetry source for installs without a battery.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPower;

impl PowerTelemetry for NoPower {
    fn read_status(&self) -> Option<PowerStatus> {
        None
    }
}

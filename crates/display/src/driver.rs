// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panel driver seam.
//!
//! The SPI controller for the physical panel is an external collaborator;
//! the manager only needs init, two draw paths, and teardown. Content is
//! laid-out text per region; rasterization is the driver's problem.

use crate::layout::{Rect, Region};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("panel unavailable: {0}")]
    Unavailable(String),

    #[error("draw failed: {0}")]
    Draw(String),
}

/// Laid-out text for one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionContent {
    pub lines: Vec<String>,
}

impl RegionContent {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn single(line: impl Into<String>) -> Self {
        Self { lines: vec![line.into()] }
    }
}

/// A complete frame: content for every region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub regions: BTreeMap<Region, RegionContent>,
}

impl Frame {
    pub fn set(&mut self, region: Region, content: RegionContent) {
        self.regions.insert(region, content);
    }

    pub fn get(&self, region: Region) -> Option<&RegionContent> {
        self.regions.get(&region)
    }
}

/// Hardware seam for the status panel.
pub trait PanelDriver: Send {
    /// Bring the controller up. Called once, retried on failure.
    fn init(&mut self) -> Result<(), DisplayError>;

    fn dimensions(&self) -> (u32, u32);

    /// Full-frame update with the 16-level grayscale waveform.
    fn draw_full(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    /// Partial update of one region with the fast mono waveform. Callers
    /// fall back to `draw_full` when this fails.
    fn draw_region(
        &mut self,
        region: Region,
        bounds: Rect,
        content: &RegionContent,
    ) -> Result<(), DisplayError>;

    /// Put the panel into its low-power state.
    fn sleep(&mut self);

    /// Release hardware handles.
    fn close(&mut self);
}

/// Recorded draw call, for tests and headless installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCall {
    Init,
    Full(Frame),
    Partial(Region, RegionContent),
    Sleep,
    Close,
}

/// Driver that records draw calls instead of talking to hardware.
#[derive(Default)]
pub struct NullPanel {
    pub width: u32,
    pub height: u32,
    pub calls: std::sync::Arc<parking_lot::Mutex<Vec<DrawCall>>>,
    /// When set, `init` fails this many times before succeeding.
    pub init_failures: u32,
    /// When set, partial draws always fail (exercises the full fallback).
    pub fail_partial: bool,
}

impl NullPanel {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, ..Default::default() }
    }
}

impl PanelDriver for NullPanel {
    fn init(&mut self) -> Result<(), DisplayError> {
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(DisplayError::Unavailable("simulated init failure".to_string()));
        }
        self.calls.lock().push(DrawCall::Init);
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw_full(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        self.calls.lock().push(DrawCall::Full(frame.clone()));
        Ok(())
    }

    fn draw_region(
        &mut self,
        region: Region,
        _bounds: Rect,
        content: &RegionContent,
    ) -> Result<(), DisplayError> {
        if self.fail_partial {
            return Err(DisplayError::Draw("simulated partial failure".to_string()));
        }
        self.calls.lock().push(DrawCall::Partial(region, content.clone()));
        Ok(())
    }

    fn sleep(&mut self) {
        self.calls.lock().push(DrawCall::Sleep);
    }

    fn close(&mut self) {
        self.calls.lock().push(DrawCall::Close);
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Display worker: coalesces refresh requests and drives the panel.

use crate::driver::{Frame, PanelDriver, RegionContent};
use crate::layout::{body_lines, region_bounds, BodyEntry, Region};
use crate::power::{PowerStatus, PowerTelemetry};
use crate::refresh::{RefreshQueue, RefreshReason, RefreshRequest, SectionSet};
use ns_core::{HumanTask, PromptRecord};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest text kept for a body entry title.
const TITLE_CHARS: usize = 48;

/// Queue state the renderer reads; the daemon bridges this to the store
/// and the Human Task side-queue.
pub trait DisplaySource: Send + Sync {
    fn human_tasks(&self) -> Vec<HumanTask>;
    /// Prompt records, newest first.
    fn prompts(&self) -> Vec<PromptRecord>;
}

/// Rendering knobs.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub brand: String,
    pub subtitles: Vec<String>,
    pub hostname: String,
    pub ip: Option<String>,
    pub max_items: usize,
    pub subtitle_interval: Duration,
    pub power_poll_interval: Duration,
    pub init_retry: Duration,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brand: "NIGHTSHIFT".to_string(),
            subtitles: vec![
                "agent host".to_string(),
                "prompt queue".to_string(),
                "scope guarded".to_string(),
            ],
            hostname: String::new(),
            ip: None,
            max_items: 5,
            subtitle_interval: Duration::from_secs(45),
            power_poll_interval: Duration::from_secs(5),
            init_retry: Duration::from_secs(30),
        }
    }
}

struct Overlay {
    title: String,
    lines: Vec<String>,
    expires_at: Option<Instant>,
}

/// Control handle returned by [`DisplayManager::start`].
pub struct DisplayHandle {
    queue: Arc<RefreshQueue>,
    stop: Arc<AtomicBool>,
    overlay: Arc<Mutex<Option<Overlay>>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    enabled: bool,
}

impl DisplayHandle {
    /// Queue a refresh using the reason's default section set.
    pub fn request_refresh(&self, reason: &str) {
        if !self.enabled {
            return;
        }
        self.queue.push(RefreshRequest::new(RefreshReason::parse(reason)));
    }

    /// Queue a refresh for explicit sections.
    pub fn request_refresh_sections(&self, reason: &str, sections: Vec<Region>) {
        if !self.enabled {
            return;
        }
        self.queue.push(RefreshRequest::with_sections(RefreshReason::parse(reason), sections));
    }

    /// Display an overlay on top of the queue view; non-priority refreshes
    /// are suppressed until it expires or is cleared.
    pub fn show_overlay(&self, title: &str, lines: Vec<String>, duration: Option<Duration>) {
        if !self.enabled {
            return;
        }
        *self.overlay.lock() = Some(Overlay {
            title: title.to_string(),
            lines,
            expires_at: duration.map(|d| Instant::now() + d),
        });
        self.queue.push(RefreshRequest::new(RefreshReason::Overlay));
    }

    pub fn clear_overlay(&self) {
        if self.overlay.lock().take().is_some() {
            self.queue.push(RefreshRequest::new(RefreshReason::Theme));
        }
    }

    /// Stop the worker: final shutdown frame, then hardware release.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.queue.push(RefreshRequest::new(RefreshReason::Shutdown));
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

/// Builder for the display worker thread.
pub struct DisplayManager;

impl DisplayManager {
    /// Spawn the worker and return its control handle.
    ///
    /// A disabled config yields an inert handle with no thread.
    pub fn start(
        driver: Box<dyn PanelDriver>,
        source: Arc<dyn DisplaySource>,
        power: Arc<dyn PowerTelemetry>,
        config: DisplayConfig,
    ) -> DisplayHandle {
        let queue = Arc::new(RefreshQueue::new());
        let stop = Arc::new(AtomicBool::new(false));
        let overlay = Arc::new(Mutex::new(None));
        let enabled = config.enabled;

        let worker = if enabled {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            let overlay = Arc::clone(&overlay);
            queue.push(RefreshRequest::new(RefreshReason::Initial));
            Some(std::thread::spawn(move || {
                Worker { driver, source, power, config, queue, stop, overlay }.run();
            }))
        } else {
            tracing::info!("status panel disabled via configuration");
            None
        };

        DisplayHandle { queue, stop, overlay, worker: Mutex::new(worker), enabled }
    }
}

struct Worker {
    driver: Box<dyn PanelDriver>,
    source: Arc<dyn DisplaySource>,
    power: Arc<dyn PowerTelemetry>,
    config: DisplayConfig,
    queue: Arc<RefreshQueue>,
    stop: Arc<AtomicBool>,
    overlay: Arc<Mutex<Option<Overlay>>>,
}

impl Worker {
    fn run(mut self) {
        tracing::info!("starting status panel worker");
        let mut initialized = false;
        let mut last_init_attempt: Option<Instant> = None;
        let mut subtitle_index = 0usize;
        let mut next_subtitle = Instant::now() + self.config.subtitle_interval;
        let mut next_power_poll = Instant::now();
        let mut last_power: Option<PowerStatus> = None;
        let mut last_minute = current_minute();

        while !self.stop.load(Ordering::SeqCst) {
            if !initialized {
                if let Some(last) = last_init_attempt {
                    if last.elapsed() < self.config.init_retry {
                        std::thread::sleep(Duration::from_millis(100));
                        continue;
                    }
                }
                match self.driver.init() {
                    Ok(()) => {
                        initialized = true;
                        last_init_attempt = None;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "status panel unavailable");
                        last_init_attempt = Some(Instant::now());
                        continue;
                    }
                }
            }

            // Timed duties run between queue waits.
            let now = Instant::now();
            if now >= next_subtitle && !self.config.subtitles.is_empty() {
                subtitle_index = (subtitle_index + 1) % self.config.subtitles.len();
                next_subtitle = now + self.config.subtitle_interval;
                self.queue.push(RefreshRequest::new(RefreshReason::Subtitle));
            }
            if now >= next_power_poll {
                next_power_poll = now + self.config.power_poll_interval;
                let reading = self.power.read_status();
                if reading != last_power {
                    last_power = reading;
                    self.queue.push(RefreshRequest::new(RefreshReason::Power));
                }
            }
            let minute = current_minute();
            if minute != last_minute {
                last_minute = minute;
                self.queue.push(RefreshRequest::new(RefreshReason::Clock));
            }
            if self.expire_overlay() {
                self.queue.push(RefreshRequest::new(RefreshReason::Theme));
            }

            let Some(request) = self.queue.pop(Duration::from_millis(500)) else {
                continue;
            };
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            self.render(&request, subtitle_index, last_power.as_ref());
        }

        self.shutdown_frame();
        self.driver.sleep();
        self.driver.close();
    }

    /// Drop an expired overlay; true when one was cleared.
    fn expire_overlay(&self) -> bool {
        let mut overlay = self.overlay.lock();
        let expired = overlay
            .as_ref()
            .and_then(|o| o.expires_at)
            .is_some_and(|deadline| Instant::now() >= deadline);
        if expired {
            *overlay = None;
        }
        expired
    }

    fn render(&mut self, request: &RefreshRequest, subtitle_index: usize, power: Option<&PowerStatus>) {
        // An active overlay owns the panel; only priority reasons redraw.
        let overlay_frame = {
            let overlay = self.overlay.lock();
            overlay.as_ref().map(|o| self.overlay_frame(o))
        };
        if let Some(frame) = overlay_frame {
            let priority = matches!(
                request.reason,
                RefreshReason::Overlay
                    | RefreshReason::Theme
                    | RefreshReason::Initial
                    | RefreshReason::Shutdown
            );
            if priority {
                if let Err(err) = self.driver.draw_full(&frame) {
                    tracing::warn!(error = %err, "overlay draw failed");
                }
            }
            return;
        }

        let frame = self.compose_frame(subtitle_index, power);
        match &request.sections {
            SectionSet::Full => {
                if let Err(err) = self.driver.draw_full(&frame) {
                    tracing::warn!(error = %err, "full frame draw failed");
                }
            }
            SectionSet::Some(regions) => {
                let (width, height) = self.driver.dimensions();
                for region in regions {
                    let content = frame.get(*region).cloned().unwrap_or_default();
                    let bounds = region_bounds(width, height, *region);
                    if let Err(err) = self.driver.draw_region(*region, bounds, &content) {
                        // Fast path failed; redraw everything instead.
                        tracing::warn!(error = %err, ?region, "partial draw failed; falling back to full frame");
                        if let Err(err) = self.driver.draw_full(&frame) {
                            tracing::warn!(error = %err, "full frame fallback failed");
                        }
                        break;
                    }
                }
            }
        }
    }

    fn compose_frame(&self, subtitle_index: usize, power: Option<&PowerStatus>) -> Frame {
        let mut frame = Frame::default();

        let subtitle = self
            .config
            .subtitles
            .get(subtitle_index % self.config.subtitles.len().max(1))
            .cloned()
            .unwrap_or_default();
        frame.set(
            Region::HeaderLeft,
            RegionContent::new(vec![self.config.brand.clone(), subtitle]),
        );
        frame.set(Region::HeaderRight, RegionContent::single(power_line(power)));

        let tasks: Vec<BodyEntry> = self
            .source
            .human_tasks()
            .into_iter()
            .map(|task| BodyEntry {
                title: truncate(&task.title, TITLE_CHARS),
                status: task.status,
                detail: String::new(),
            })
            .collect();
        let prompts: Vec<BodyEntry> = self
            .source
            .prompts()
            .into_iter()
            .map(|record| BodyEntry {
                title: truncate(&record.text, TITLE_CHARS),
                status: record.status.to_string(),
                detail: record
                    .result_summary
                    .map(|summary| truncate(&summary, TITLE_CHARS))
                    .unwrap_or_default(),
            })
            .collect();
        frame.set(
            Region::Body,
            RegionContent::new(body_lines(&tasks, &prompts, self.config.max_items)),
        );

        let footer_left = match &self.config.ip {
            Some(ip) => format!("{} · {}", self.config.hostname, ip),
            None => self.config.hostname.clone(),
        };
        frame.set(Region::FooterLeft, RegionContent::single(footer_left));
        frame.set(Region::FooterRight, RegionContent::single(current_minute()));
        frame
    }

    fn overlay_frame(&self, overlay: &Overlay) -> Frame {
        let mut frame = Frame::default();
        frame.set(Region::HeaderLeft, RegionContent::single(self.config.brand.clone()));
        let mut lines = vec![overlay.title.clone()];
        lines.extend(overlay.lines.iter().cloned());
        frame.set(Region::Body, RegionContent::new(lines));
        frame
    }

    /// Final frame before the panel powers down: black with the brand
    /// centered.
    fn shutdown_frame(&mut self) {
        let mut frame = Frame::default();
        frame.set(Region::Body, RegionContent::single(self.config.brand.clone()));
        if let Err(err) = self.driver.draw_full(&frame) {
            tracing::warn!(error = %err, "shutdown frame draw failed");
        }
    }
}

fn power_line(power: Option<&PowerStatus>) -> String {
    match power {
        Some(status) if status.ac_power => format!("AC {:.0}%", status.percent),
        Some(status) if status.low_battery => format!("LOW {:.0}%", status.percent),
        Some(status) => format!("{:.0}%", status.percent),
        None => "--".to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

fn current_minute() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

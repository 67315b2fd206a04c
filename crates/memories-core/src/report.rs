use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::Error;

/// Something worth telling the user about while a batch keeps running.
#[derive(Debug)]
pub enum Event {
    /// Overlay was resized to the base image before compositing
    DimensionMismatch {
        base: PathBuf,
        base_size: (u32, u32),
        overlay_size: (u32, u32),
    },
    /// Container has no GPS support here, location left out
    GpsSkipped { path: PathBuf },
    /// Item produced no output
    ItemSkipped { item: String, error: Error },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::DimensionMismatch {
                base,
                base_size,
                overlay_size,
            } => write!(
                f,
                "image dimensions differ for {}: base {}x{}, overlay {}x{} (overlay resized)",
                base.display(),
                base_size.0,
                base_size.1,
                overlay_size.0,
                overlay_size.1
            ),
            Event::GpsSkipped { path } => {
                write!(f, "no GPS support for {}, location not written", path.display())
            }
            Event::ItemSkipped { item, error } => write!(f, "skipped {item}: {error}"),
        }
    }
}

/// Receiver for item-level diagnostics, injected into every component.
pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        log_event(&event);
    }
}

fn log_event(event: &Event) {
    match event {
        Event::ItemSkipped { .. } => tracing::error!("{event}"),
        _ => tracing::warn!("{event}"),
    }
}

/// Logs events and keeps their messages for the batch summary.
#[derive(Debug, Default)]
pub struct CollectingSink {
    warnings: Mutex<Vec<String>>,
    skipped: Mutex<u64>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `ItemSkipped` events seen so far
    pub fn skipped(&self) -> u64 {
        *self.skipped.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: Event) {
        log_event(&event);
        if matches!(event, Event::ItemSkipped { .. }) {
            *self.skipped.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        }
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.to_string());
    }
}

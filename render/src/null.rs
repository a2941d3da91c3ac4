//! The null backend: accepts the full command stream and does nothing.
//!
//! Used for headless operation and for exercising the frontend in tests. An
//! optional trace collects the kind of every processed command so tests can
//! assert on the replayed sequence.

use crate::backend::{AllocationInfo, Backend, DeviceInfo, Frame};
use crate::command::{Command, ResourceId};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct NullBackend {
    trace: Option<Arc<Mutex<Vec<String>>>>,
}

impl NullBackend {
    pub fn new() -> NullBackend {
        NullBackend::default()
    }

    /// Every processed command pushes a short kind string into `trace`.
    pub fn with_trace(trace: Arc<Mutex<Vec<String>>>) -> NullBackend {
        NullBackend {
            trace: Some(trace),
        }
    }
}

fn resource_kind(resource: &ResourceId) -> &'static str {
    match resource {
        ResourceId::Buffer(_) => "buffer",
        ResourceId::Target(_) => "target",
        ResourceId::Program(_) => "program",
        ResourceId::Texture1D(_) => "texture1D",
        ResourceId::Texture2D(_) => "texture2D",
        ResourceId::Texture3D(_) => "texture3D",
        ResourceId::TextureCM(_) => "textureCM",
    }
}

impl Backend for NullBackend {
    fn query_allocation_info(&self) -> AllocationInfo {
        AllocationInfo::default()
    }

    fn query_device_info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor: String::from("null"),
            renderer: String::from("null"),
            version: String::from("null"),
        }
    }

    fn init(&mut self) -> bool {
        true
    }

    fn process(&mut self, frame: Frame<'_>) {
        let trace = match &self.trace {
            Some(trace) => trace,
            None => return,
        };
        let mut trace = trace.lock().unwrap();
        for record in frame.commands.iter() {
            let entry = match &record.command {
                Command::ResourceAllocate { resource } => {
                    format!("resource_allocate {}", resource_kind(resource))
                }
                Command::ResourceConstruct { resource } => {
                    format!("resource_construct {}", resource_kind(resource))
                }
                Command::ResourceUpdate { resource, edits } => {
                    format!("resource_update {} {}", resource_kind(resource), edits.len())
                }
                Command::ResourceDestroy { resource } => {
                    format!("resource_destroy {}", resource_kind(resource))
                }
                Command::Clear(_) => String::from("clear"),
                Command::Draw(_) => String::from("draw"),
                Command::Blit(_) => String::from("blit"),
                Command::Profile(_) => String::from("profile"),
            };
            trace.push(entry);
        }
    }

    fn swap(&mut self) {}
}

//! Host environment capability.
//!
//! Page URL, user agent and device hints are read through this trait so the
//! pipeline never touches host globals directly. Every accessor is optional:
//! a host that cannot provide a value returns `None` and the field is omitted.

use std::sync::{Arc, RwLock};
use serde::{Deserialize, Serialize};

/// Information the embedding host can expose about the current page/device.
pub trait HostEnvironment: Send + Sync + std::fmt::Debug {
    fn url(&self) -> Option<String>;
    fn user_agent(&self) -> Option<String>;
    fn device_memory(&self) -> Option<f64> {
        None
    }
    fn connection_type(&self) -> Option<String> {
        None
    }
}

pub type SharedHost = Arc<dyn HostEnvironment>;

/// Snapshot of host values, updatable at runtime (e.g. on navigation).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostSnapshot {
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub device_memory: Option<f64>,
    pub connection_type: Option<String>,
}

/// A host backed by a mutable snapshot.
#[derive(Debug, Default)]
pub struct StaticHost {
    inner: RwLock<HostSnapshot>,
}

impl StaticHost {
    pub fn new(snapshot: HostSnapshot) -> Self {
        Self { inner: RwLock::new(snapshot) }
    }

    /// Host for server-side use: no page, a fixed agent string.
    pub fn server() -> Self {
        Self::new(HostSnapshot {
            user_agent: Some(format!("telemetry-pipeline/{}", env!("CARGO_PKG_VERSION"))),
            ..HostSnapshot::default()
        })
    }

    /// Record a navigation to a new page.
    pub fn navigate(&self, url: impl Into<String>) {
        self.inner.write().expect("host snapshot lock poisoned").url = Some(url.into());
    }

    pub fn snapshot(&self) -> HostSnapshot {
        self.inner.read().expect("host snapshot lock poisoned").clone()
    }
}

impl HostEnvironment for StaticHost {
    fn url(&self) -> Option<String> {
        self.inner.read().ok()?.url.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.inner.read().ok()?.user_agent.clone()
    }

    fn device_memory(&self) -> Option<f64> {
        self.inner.read().ok()?.device_memory
    }

    fn connection_type(&self) -> Option<String> {
        self.inner.read().ok()?.connection_type.clone()
    }
}

//! Environment collaborators consumed by the dispatcher: installed transport
//! subsystems and the current time.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::config::TransportConfig;

/// External delivery subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Sms,
    Email,
}

/// Reports whether an external subsystem is installed and enabled
pub trait Capabilities: Send + Sync {
    fn is_installed(&self, capability: Capability) -> bool;
}

/// Capability set fixed at startup
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCapabilities {
    pub sms: bool,
    pub email: bool,
}

impl StaticCapabilities {
    pub fn all() -> Self {
        Self {
            sms: true,
            email: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

impl From<&TransportConfig> for StaticCapabilities {
    fn from(config: &TransportConfig) -> Self {
        Self {
            sms: config.sms_enabled,
            email: config.email_enabled,
        }
    }
}

impl Capabilities for StaticCapabilities {
    fn is_installed(&self, capability: Capability) -> bool {
        match capability {
            Capability::Sms => self.sms,
            Capability::Email => self.email,
        }
    }
}

/// Time source in seconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Manually advanced clock, for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

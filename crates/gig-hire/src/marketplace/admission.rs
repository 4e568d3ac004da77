use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

use crate::config::AdmissionConfig;
use crate::marketplace::domain::UserId;

/// Who is asking and from where; the unit rate limits are tracked against.
/// `origin` is `None` when no peer address could be established.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdmissionKey {
    pub caller: UserId,
    pub origin: Option<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

/// How the client origin of a request is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginPolicy {
    /// Socket peer only; forwarding headers are client-controlled and ignored.
    #[default]
    SocketPeer,
    /// First `x-forwarded-for` hop, then `x-real-ip`, for deployments behind a proxy
    /// that rewrites those headers. Unparseable values fall back to the peer.
    TrustForwarded,
}

impl OriginPolicy {
    pub fn from_trust(trust_forwarded: bool) -> Self {
        if trust_forwarded {
            Self::TrustForwarded
        } else {
            Self::SocketPeer
        }
    }

    pub fn resolve(self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
        if self == Self::SocketPeer {
            return peer;
        }

        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse::<IpAddr>().ok());
        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<IpAddr>().ok())
        };

        forwarded.or_else(real_ip).or(peer)
    }
}

/// Upstream verdict on whether a request may reach the marketplace service at all.
pub trait AdmissionGate: Send + Sync {
    fn admit(&self, key: &AdmissionKey) -> Admission;

    /// Stop counting the most recent admitted attempt, e.g. once it succeeded.
    fn forgive(&self, key: &AdmissionKey);
}

#[derive(Debug, Default)]
struct AttemptLogs {
    by_key: HashMap<AdmissionKey, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl AttemptLogs {
    /// Drops every key whose newest attempt left the window; runs at most once per window.
    fn sweep(&mut self, now: Instant, window: Duration) {
        let due = self
            .last_sweep
            .map_or(true, |at| now.saturating_duration_since(at) >= window);
        if !due {
            return;
        }

        self.by_key.retain(|_, log| {
            log.back()
                .is_some_and(|newest| now.saturating_duration_since(*newest) < window)
        });
        self.last_sweep = Some(now);
    }
}

/// Sliding-window log limiter: at most `max_attempts` admissions per key within any
/// trailing `window`. Keys with no attempt left in the window are evicted.
#[derive(Debug)]
pub struct SlidingWindowGate {
    config: AdmissionConfig,
    attempts: Mutex<AttemptLogs>,
}

impl SlidingWindowGate {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            attempts: Mutex::new(AttemptLogs::default()),
        }
    }

    pub(crate) fn admit_at(&self, key: &AdmissionKey, now: Instant) -> Admission {
        let Ok(mut attempts) = self.attempts.lock() else {
            // poisoned log: fail open
            return Admission::Admitted;
        };
        attempts.sweep(now, self.config.window);
        let log = attempts.by_key.entry(key.clone()).or_default();

        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.config.max_attempts as usize {
            let retry_after = log
                .front()
                .map(|oldest| self.config.window - now.saturating_duration_since(*oldest))
                .unwrap_or(self.config.window);
            return Admission::Rejected { retry_after };
        }

        log.push_back(now);
        Admission::Admitted
    }

    /// Number of keys currently holding an attempt log.
    pub fn tracked_keys(&self) -> usize {
        self.attempts
            .lock()
            .map(|attempts| attempts.by_key.len())
            .unwrap_or(0)
    }
}

impl AdmissionGate for SlidingWindowGate {
    fn admit(&self, key: &AdmissionKey) -> Admission {
        self.admit_at(key, Instant::now())
    }

    fn forgive(&self, key: &AdmissionKey) {
        if let Ok(mut attempts) = self.attempts.lock() {
            if let Some(log) = attempts.by_key.get_mut(key) {
                log.pop_back();
                if log.is_empty() {
                    attempts.by_key.remove(key);
                }
            }
        }
    }
}

/// Gate that admits everything; used where no limit is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl AdmissionGate for OpenGate {
    fn admit(&self, _key: &AdmissionKey) -> Admission {
        Admission::Admitted
    }

    fn forgive(&self, _key: &AdmissionKey) {}
}

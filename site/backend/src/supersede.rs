//! Last-write-wins bookkeeping for concurrent filter events.
//!
//! A client tags each chart request with an increasing sequence number.
//! Results from an older sequence are dropped once a newer one for the
//! same client and chart has been seen. Entries idle longer than the TTL
//! are pruned and the table never holds more than `max_entries` keys.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{DashboardError, Result};

pub const ENTRY_TTL: Duration = Duration::from_secs(10 * 60);
pub const MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chart {
    Map,
    Trend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    client: String,
    chart: Chart,
    seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Latest {
    seq: u64,
    seen: Instant,
}

#[derive(Debug)]
pub struct Superseder {
    latest: Mutex<HashMap<(String, Chart), Latest>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for Superseder {
    fn default() -> Self {
        Self::with_limits(ENTRY_TTL, MAX_ENTRIES)
    }
}

impl Superseder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            latest: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<(String, Chart), Latest>>> {
        self.latest
            .lock()
            .map_err(|_| DashboardError::Query("superseder lock poisoned".to_string()))
    }

    fn latest_seq(&self, client: &str, chart: Chart) -> Result<Option<u64>> {
        let latest = self.lock()?;
        Ok(latest.get(&(client.to_string(), chart)).map(|l| l.seq))
    }

    /// Registers event `seq`. Fails if a newer event for the same client and
    /// chart is already registered.
    pub fn begin(&self, client: &str, chart: Chart, seq: u64) -> Result<Ticket> {
        self.begin_at(client, chart, seq, Instant::now())
    }

    fn begin_at(&self, client: &str, chart: Chart, seq: u64, now: Instant) -> Result<Ticket> {
        let mut latest = self.lock()?;
        let ttl = self.ttl;
        latest.retain(|_, l| now.saturating_duration_since(l.seen) < ttl);

        let key = (client.to_string(), chart);
        if !latest.contains_key(&key) && latest.len() >= self.max_entries {
            let oldest = latest
                .iter()
                .min_by_key(|(_, l)| l.seen)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                latest.remove(&oldest);
            }
        }

        let entry = latest.entry(key).or_insert(Latest { seq, seen: now });
        if entry.seq > seq {
            return Err(DashboardError::Superseded);
        }
        *entry = Latest { seq, seen: now };
        Ok(Ticket {
            client: client.to_string(),
            chart,
            seq,
        })
    }

    /// Hands `value` back only if no newer event arrived since `begin`.
    pub fn finish<T>(&self, ticket: &Ticket, value: T) -> Result<T> {
        match self.latest_seq(&ticket.client, ticket.chart)? {
            Some(latest) if latest > ticket.seq => {
                tracing::debug!(
                    client = %ticket.client,
                    seq = ticket.seq,
                    latest,
                    "Dropping superseded {:?} result",
                    ticket.chart
                );
                Err(DashboardError::Superseded)
            }
            _ => Ok(value),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.latest.lock().map(|l| l.len()).unwrap_or(0)
    }
}

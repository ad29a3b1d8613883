//! Per-run request aggregation.
//!
//! An [`Analysis`] is created for one run, fed entries, then evaluated.
//! Nothing is shared between runs.

use std::collections::HashMap;
use std::net::IpAddr;

use botstats_schema::LogEntry;
use chrono::{DateTime, Utc};

use crate::metrics::AddressMetric;

/// Request timestamps recorded for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    address: IpAddr,
    timestamps: Vec<DateTime<Utc>>,
}

impl AddressRecord {
    fn new(address: IpAddr, first: DateTime<Utc>) -> Self {
        Self {
            address,
            timestamps: vec![first],
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Timestamps in ingestion order.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn request_count(&self) -> usize {
        self.timestamps.len()
    }

    /// Rate, danger and suspicion for this address.
    pub fn evaluate(&self, rate_threshold: f64) -> AddressMetric {
        AddressMetric::from_timestamps(self.address, &self.timestamps, rate_threshold)
    }
}

/// Accumulated state of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    records: HashMap<IpAddr, AddressRecord>,
    entries_processed: usize,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request.
    pub fn ingest(&mut self, entry: &LogEntry) {
        self.entries_processed += 1;
        self.records
            .entry(entry.address)
            .and_modify(|record| record.timestamps.push(entry.timestamp))
            .or_insert_with(|| AddressRecord::new(entry.address, entry.timestamp));
    }

    /// Record every entry, stopping at the first error.
    ///
    /// Returns the number of entries ingested by this call.
    pub fn ingest_all<I, E>(&mut self, entries: I) -> Result<usize, E>
    where
        I: IntoIterator<Item = Result<LogEntry, E>>,
    {
        let mut count = 0;
        for entry in entries {
            self.ingest(&entry?);
            count += 1;
        }
        Ok(count)
    }

    /// Total entries ingested.
    pub fn entries_processed(&self) -> usize {
        self.entries_processed
    }

    /// Number of distinct addresses seen.
    pub fn address_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for one address.
    pub fn record(&self, address: &IpAddr) -> Option<&AddressRecord> {
        self.records.get(address)
    }

    /// Metrics for every address, sorted by address.
    pub fn evaluate(&self, rate_threshold: f64) -> Vec<AddressMetric> {
        let mut metrics: Vec<AddressMetric> = self
            .records
            .values()
            .map(|record| record.evaluate(rate_threshold))
            .collect();
        metrics.sort_by_key(|m| m.address);
        metrics
    }
}

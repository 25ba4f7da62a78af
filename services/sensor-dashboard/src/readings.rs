//! Sensor reading records and the live query shape
//!
//! A snapshot from the backend delivers [`ReadingDocument`]s in the
//! backend's native form. They are materialized into [`Reading`]s, with the
//! native epoch timestamp normalized to UTC, before entering view state.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of readings kept in the display window
pub const READING_LIMIT: usize = 10;

/// One sensor sample as displayed by the dashboard
///
/// Immutable value record. Readings are never patched in place; every
/// snapshot replaces the whole window.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Backend-assigned document id, unique within the collection
    pub id: String,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Sample time; `None` until the backend has stamped the document
    pub timestamp: Option<DateTime<Utc>>,
}

/// Backend-native timestamp, epoch seconds plus nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTimestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanos: u32,
}

impl BackendTimestamp {
    /// Normalize into a UTC point in time.
    ///
    /// Returns `None` for values outside the representable range.
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos).single()
    }
}

/// A reading as delivered by a snapshot, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingDocument {
    pub id: String,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub timestamp: Option<BackendTimestamp>,
}

impl ReadingDocument {
    /// Materialize the document into a display record
    pub fn materialize(&self) -> Reading {
        Reading {
            id: self.id.clone(),
            temperature: self.temperature,
            humidity: self.humidity,
            timestamp: self.timestamp.and_then(BackendTimestamp::to_utc),
        }
    }
}

/// Parameters of the live subscription
///
/// The backend orders and bounds the result set; the view-model never
/// reorders or truncates what arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingQuery {
    pub collection: String,
    pub order_by: String,
    pub descending: bool,
    pub limit: usize,
}

impl ReadingQuery {
    /// Query for the most recent readings in a collection, newest first
    pub fn latest_readings(collection: impl Into<String>, limit: usize) -> Self {
        Self {
            collection: collection.into(),
            order_by: "timestamp".to_string(),
            descending: true,
            limit,
        }
    }
}

impl Default for ReadingQuery {
    fn default() -> Self {
        Self::latest_readings("sensorReadings", READING_LIMIT)
    }
}

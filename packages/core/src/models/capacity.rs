//! Capacities, Labels and Reservation Types
//!
//! Structured node properties carried as JSON-encoded strings in the
//! exchange format:
//!
//! - `Capacities` — provisionable resource quantities (cores, ram, disk,
//!   bandwidth, generic units)
//! - `Labels` — addressing information (IPv4/IPv6/MAC/VLAN)
//! - `CapacityDelta` / `TimeWindow` — the capacity-subtraction contract with
//!   the external reservation collaborator
//! - `StructuralInfo` — per-element provenance the broker keeps on a CBM
//!
//! Serialization skips zero/empty fields so the encoded form stays compact
//! and stable across round trips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Add;

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_empty(v: &Vec<String>) -> bool {
    v.is_empty()
}

/// Resource quantities of a provisionable element.
///
/// Addition is saturating and field-wise; it is used both to roll up
/// per-site aggregates and to sum reservation deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacities {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub core: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ram: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub disk: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub bw: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub unit: i64,
}

impl Capacities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_core(mut self, core: i64) -> Self {
        self.core = core;
        self
    }

    pub fn with_ram(mut self, ram: i64) -> Self {
        self.ram = ram;
        self
    }

    pub fn with_disk(mut self, disk: i64) -> Self {
        self.disk = disk;
        self
    }

    pub fn with_bw(mut self, bw: i64) -> Self {
        self.bw = bw;
        self
    }

    pub fn with_unit(mut self, unit: i64) -> Self {
        self.unit = unit;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Field-wise subtraction clamped at zero: available capacity never
    /// goes negative even when reservations oversubscribe.
    pub fn saturating_sub(&self, other: &Capacities) -> Capacities {
        Capacities {
            core: (self.core - other.core).max(0),
            ram: (self.ram - other.ram).max(0),
            disk: (self.disk - other.disk).max(0),
            bw: (self.bw - other.bw).max(0),
            unit: (self.unit - other.unit).max(0),
        }
    }
}

impl Add for Capacities {
    type Output = Capacities;

    fn add(self, other: Capacities) -> Capacities {
        Capacities {
            core: self.core.saturating_add(other.core),
            ram: self.ram.saturating_add(other.ram),
            disk: self.disk.saturating_add(other.disk),
            bw: self.bw.saturating_add(other.bw),
            unit: self.unit.saturating_add(other.unit),
        }
    }
}

/// Addressing information of a node or connection point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    #[serde(default, skip_serializing_if = "is_empty")]
    pub ipv4: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub ipv6: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub mac: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub vlan: Vec<String>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ipv4(mut self, addr: impl Into<String>) -> Self {
        self.ipv4.push(addr.into());
        self
    }

    pub fn with_mac(mut self, addr: impl Into<String>) -> Self {
        self.mac.push(addr.into());
        self
    }

    pub fn with_vlan(mut self, vlan: impl Into<String>) -> Self {
        self.vlan.push(vlan.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty() && self.mac.is_empty() && self.vlan.is_empty()
    }
}

/// Half-open time interval `[start, end)` of a broker query or reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Degenerate "now" window used by instantaneous queries.
    pub fn now() -> Self {
        let t = Utc::now();
        Self { start: t, end: t }
    }

    /// Half-open overlap: `[a, b)` and `[b, c)` do not overlap. A
    /// degenerate window stands for the single instant `start` and
    /// overlaps exactly the windows containing that instant.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        match (self.start == self.end, other.start == other.end) {
            (true, true) => self.start == other.start,
            (true, false) => other.start <= self.start && self.start < other.end,
            (false, true) => self.start <= other.start && other.start < self.end,
            (false, false) => self.start < other.end && other.start < self.end,
        }
    }
}

/// One reservation's claim against a node's capacity over a time range.
/// Supplied by the external calendar/reservation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityDelta {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub capacities: Capacities,
}

impl CapacityDelta {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

/// Provenance record the broker maintains per CBM node/edge: the set of ADM
/// graph ids that contributed the element. Unmerge removes an element only
/// when its set drains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralInfo {
    #[serde(default)]
    pub adm_graph_ids: Vec<String>,
}

impl StructuralInfo {
    pub fn single(adm_graph_id: impl Into<String>) -> Self {
        Self {
            adm_graph_ids: vec![adm_graph_id.into()],
        }
    }

    /// Add a contributor; set semantics, so re-merging the same ADM is a
    /// no-op.
    pub fn add(&mut self, adm_graph_id: &str) {
        if !self.adm_graph_ids.iter().any(|id| id == adm_graph_id) {
            self.adm_graph_ids.push(adm_graph_id.to_string());
        }
    }

    /// Remove a contributor; returns true if the element has no remaining
    /// contributors and should be deleted.
    pub fn remove(&mut self, adm_graph_id: &str) -> bool {
        self.adm_graph_ids.retain(|id| id != adm_graph_id);
        self.adm_graph_ids.is_empty()
    }

    pub fn contains(&self, adm_graph_id: &str) -> bool {
        self.adm_graph_ids.iter().any(|id| id == adm_graph_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_capacities_compact_encoding() {
        let caps = Capacities::new().with_core(4).with_ram(64);
        let encoded = serde_json::to_string(&caps).unwrap();
        assert_eq!(encoded, r#"{"core":4,"ram":64}"#);
        let decoded: Capacities = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, caps);
    }

    #[test]
    fn test_capacities_arithmetic() {
        let total = Capacities::new().with_core(8).with_ram(128);
        let claimed = Capacities::new().with_core(6).with_ram(256);
        let available = total.saturating_sub(&claimed);
        assert_eq!(available.core, 2);
        assert_eq!(available.ram, 0);

        let sum = total + claimed;
        assert_eq!(sum.core, 14);
    }

    #[test]
    fn test_window_overlap() {
        let jan = TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        );
        let mid_jan = TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap(),
        );
        let march = TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
        );
        assert!(jan.overlaps(&mid_jan));
        assert!(mid_jan.overlaps(&jan));
        assert!(!jan.overlaps(&march));
    }

    #[test]
    fn test_adjacent_windows_do_not_overlap() {
        let december = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        );
        let january = TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        );
        // [a, b) then [b, c): the shared boundary belongs to january only
        assert!(!december.overlaps(&january));
        assert!(!january.overlaps(&december));
    }

    #[test]
    fn test_instant_window_overlap() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let january = TimeWindow::new(start, end);

        // the instant at the inclusive start is covered, the one at the
        // exclusive end is not
        assert!(TimeWindow::new(start, start).overlaps(&january));
        assert!(january.overlaps(&TimeWindow::new(start, start)));
        assert!(!TimeWindow::new(end, end).overlaps(&january));

        assert!(TimeWindow::new(start, start).overlaps(&TimeWindow::new(start, start)));
    }

    #[test]
    fn test_structural_info_set_semantics() {
        let mut si = StructuralInfo::single("adm-1");
        si.add("adm-1");
        si.add("adm-2");
        assert_eq!(si.adm_graph_ids.len(), 2);
        assert!(!si.remove("adm-1"));
        assert!(si.remove("adm-2"));
    }
}

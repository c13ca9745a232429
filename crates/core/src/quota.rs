//! Hierarchical disk quota accounting.
//!
//! A [`QuotaNode`] tracks a byte budget. Allocations bubble up through every
//! ancestor, so a repository node and the global node always agree on what
//! has been written.

use crate::{Error, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Parsed capacity expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capacity {
    /// Absolute number of bytes.
    Bytes(u64),
    /// Percentage of a volume or of the parent node's capacity.
    Percent(u64),
    /// No limit.
    Unlimited,
}

impl Capacity {
    /// Parse `90%`, `500MB`, `10GB`, `512KB`, `100B` or a bare byte count.
    /// An empty string means unlimited.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self::Unlimited);
        }

        if let Some(percent) = value.strip_suffix('%') {
            let percent: u64 = percent
                .trim()
                .parse()
                .map_err(|_| Error::InvalidQuota(value.to_string()))?;
            if percent > 100 {
                return Err(Error::InvalidQuota(format!("{value} exceeds 100%")));
            }
            return Ok(Self::Percent(percent));
        }

        let upper = value.to_ascii_uppercase();
        let (digits, factor) = if let Some(n) = upper.strip_suffix("GB") {
            (n, GIB)
        } else if let Some(n) = upper.strip_suffix("MB") {
            (n, MIB)
        } else if let Some(n) = upper.strip_suffix("KB") {
            (n, KIB)
        } else if let Some(n) = upper.strip_suffix('B') {
            (n, 1)
        } else {
            (upper.as_str(), 1)
        };

        let amount: u64 = digits
            .trim()
            .parse()
            .map_err(|_| Error::InvalidQuota(value.to_string()))?;

        amount
            .checked_mul(factor)
            .map(Self::Bytes)
            .ok_or_else(|| Error::InvalidQuota(format!("{value} is too large")))
    }

    /// Resolve against a volume: percentages use the total size of the
    /// filesystem holding `dir` (or its nearest existing ancestor).
    pub fn resolve_for_volume(self, dir: &Path) -> Result<u64> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Unlimited => Ok(u64::MAX),
            Self::Percent(percent) => {
                let total = fs2::total_space(existing_ancestor(dir))?;
                Ok(percent_of(total, percent))
            }
        }
    }

    /// Resolve against a parent node: percentages use the parent's capacity.
    pub fn resolve_for_parent(self, parent: &QuotaNode) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Unlimited => parent.capacity(),
            Self::Percent(percent) => percent_of(parent.capacity(), percent),
        }
    }
}

fn percent_of(total: u64, percent: u64) -> u64 {
    ((total as u128 * percent as u128) / 100) as u64
}

fn existing_ancestor(dir: &Path) -> &Path {
    let mut current = dir;
    while !current.exists() {
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
    current
}

/// Byte budget with an optional parent.
#[derive(Debug)]
pub struct QuotaNode {
    capacity: u64,
    usage: AtomicU64,
    parent: Option<Arc<QuotaNode>>,
}

impl QuotaNode {
    /// Create a root node.
    pub fn root(capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            usage: AtomicU64::new(0),
            parent: None,
        })
    }

    /// Create an unlimited root node.
    pub fn unlimited() -> Arc<Self> {
        Self::root(u64::MAX)
    }

    /// Create a child node chained to `parent`.
    pub fn child(parent: &Arc<QuotaNode>, capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            usage: AtomicU64::new(0),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Record `bytes` against this node and every ancestor, parent first.
    pub fn allocate(&self, bytes: u64) {
        if let Some(parent) = &self.parent {
            parent.allocate(bytes);
        }
        self.usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |usage| {
                Some(usage.saturating_add(bytes))
            })
            .ok();
    }

    /// True iff this node and every ancestor have `usage < capacity`.
    pub fn has_space(&self) -> bool {
        let parent_has_space = self.parent.as_ref().is_none_or(|p| p.has_space());
        parent_has_space && self.usage() < self.capacity
    }

    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn parent(&self) -> Option<&Arc<QuotaNode>> {
        self.parent.as_ref()
    }
}

impl fmt::Display for QuotaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let capacity = if self.capacity == u64::MAX {
            "unlimited".to_string()
        } else {
            human_bytes(self.capacity)
        };
        write!(f, "{}/{}", human_bytes(self.usage()), capacity)
    }
}

/// Render a byte count with a binary unit.
pub fn human_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= GIB => format!("{:.1}GB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1}MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1}KB", b as f64 / KIB as f64),
        b => format!("{b}B"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_parse_units() {
        assert_eq!(Capacity::parse("100").unwrap(), Capacity::Bytes(100));
        assert_eq!(Capacity::parse("100B").unwrap(), Capacity::Bytes(100));
        assert_eq!(Capacity::parse("2KB").unwrap(), Capacity::Bytes(2048));
        assert_eq!(Capacity::parse("500MB").unwrap(), Capacity::Bytes(500 * MIB));
        assert_eq!(Capacity::parse("10GB").unwrap(), Capacity::Bytes(10 * GIB));
        assert_eq!(Capacity::parse("10gb").unwrap(), Capacity::Bytes(10 * GIB));
        assert_eq!(Capacity::parse("90%").unwrap(), Capacity::Percent(90));
        assert_eq!(Capacity::parse("").unwrap(), Capacity::Unlimited);
    }

    #[test]
    fn test_capacity_parse_rejects_garbage() {
        assert!(Capacity::parse("lots").is_err());
        assert!(Capacity::parse("10TB").is_err());
        assert!(Capacity::parse("150%").is_err());
        assert!(Capacity::parse("-1GB").is_err());
    }

    #[test]
    fn test_percent_of_parent() {
        let root = QuotaNode::root(1000);
        assert_eq!(Capacity::Percent(25).resolve_for_parent(&root), 250);
        assert_eq!(Capacity::Unlimited.resolve_for_parent(&root), 1000);
    }

    #[test]
    fn test_percent_of_volume() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not").join("yet").join("created");
        let capacity = Capacity::Percent(100).resolve_for_volume(&missing).unwrap();
        assert!(capacity > 0);
    }

    #[test]
    fn test_allocate_bubbles_to_root() {
        let root = QuotaNode::root(1000);
        let a = QuotaNode::child(&root, 500);
        let b = QuotaNode::child(&root, 500);

        a.allocate(100);
        b.allocate(50);

        assert_eq!(a.usage(), 100);
        assert_eq!(b.usage(), 50);
        assert_eq!(root.usage(), 150);
    }

    #[test]
    fn test_child_full_when_ancestor_full() {
        let root = QuotaNode::root(100);
        let a = QuotaNode::child(&root, 1000);
        let b = QuotaNode::child(&root, 1000);

        a.allocate(100);

        assert!(!root.has_space());
        assert!(!b.has_space(), "sibling must see the exhausted parent");
        assert_eq!(b.usage(), 0);
    }

    #[test]
    fn test_has_space_is_strict() {
        let root = QuotaNode::root(10);
        root.allocate(9);
        assert!(root.has_space());
        root.allocate(1);
        assert!(!root.has_space());
    }

    #[test]
    fn test_concurrent_allocation() {
        let root = QuotaNode::unlimited();
        let children: Vec<_> = (0..4).map(|_| QuotaNode::child(&root, u64::MAX)).collect();

        std::thread::scope(|scope| {
            for child in &children {
                scope.spawn(move || {
                    for _ in 0..1000 {
                        child.allocate(3);
                    }
                });
            }
        });

        assert_eq!(root.usage(), 4 * 1000 * 3);
    }

    #[test]
    fn test_display() {
        let root = QuotaNode::root(2 * KIB);
        root.allocate(512);
        assert_eq!(root.to_string(), "512B/2.0KB");
        assert_eq!(QuotaNode::unlimited().to_string(), "0B/unlimited");
    }
}

//! Vector session token: per-partition replication progress
//!
//! A token encodes the progress a client has observed for one partition
//! range of a multi-region deployment: a version (bumped when the region
//! topology of the partition changes), a global log sequence number, and a
//! per-region local LSN map. String form:
//!
//! ```text
//! <version>#<globalLsn>#<region>=<lsn>#<region>=<lsn>...
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use crate::{Error, Result};

/// Separator between the version, global LSN, and region segments
const SEGMENT_SEPARATOR: char = '#';
/// Separator between a region index and its local LSN
const REGION_SEPARATOR: char = '=';

/// Immutable replication-progress marker for one partition range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSessionToken {
    version: i64,
    global_lsn: i64,
    /// Region index -> region-local LSN. A `BTreeMap` keeps the rendered
    /// form canonical regardless of the order regions appeared in.
    region_progress: BTreeMap<u32, i64>,
}

impl VectorSessionToken {
    /// Build a token from already-validated parts (test fixtures, merges)
    pub fn new(version: i64, global_lsn: i64, region_progress: BTreeMap<u32, i64>) -> Self {
        Self {
            version,
            global_lsn,
            region_progress,
        }
    }

    /// Parse the wire form. Returns `None` on any malformed input: empty
    /// string, missing segments, non-numeric fields, malformed or duplicate
    /// region entries. Never panics.
    pub fn try_parse(input: &str) -> Option<Self> {
        let mut segments = input.split(SEGMENT_SEPARATOR);
        let version = segments.next()?.parse::<i64>().ok()?;
        let global_lsn = segments.next()?.parse::<i64>().ok()?;

        let mut region_progress = BTreeMap::new();
        for segment in segments {
            let (region, local_lsn) = segment.split_once(REGION_SEPARATOR)?;
            let region = region.parse::<u32>().ok()?;
            let local_lsn = local_lsn.parse::<i64>().ok()?;
            if region_progress.insert(region, local_lsn).is_some() {
                return None;
            }
        }

        Some(Self {
            version,
            global_lsn,
            region_progress,
        })
    }

    /// Global log sequence number carried by this token
    pub fn lsn(&self) -> i64 {
        self.global_lsn
    }

    /// Partition epoch version carried by this token
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Whether `self` is at least as advanced as `other`.
    ///
    /// A strictly newer version dominates regardless of LSNs; at equal
    /// version the comparison is pointwise over the region map. Equal
    /// versions with different region sets are a protocol violation and
    /// surface as [`Error::InternalServer`].
    pub fn is_valid(&self, other: &Self) -> Result<bool> {
        match self.version.cmp(&other.version) {
            Ordering::Greater => Ok(true),
            Ordering::Less => Ok(false),
            Ordering::Equal => {
                if self.region_progress.len() != other.region_progress.len() {
                    return Err(region_set_mismatch(self, other));
                }
                for (region, other_lsn) in &other.region_progress {
                    match self.region_progress.get(region) {
                        Some(lsn) if lsn >= other_lsn => {}
                        Some(_) => return Ok(false),
                        None => return Err(region_set_mismatch(self, other)),
                    }
                }
                Ok(true)
            }
        }
    }

    /// Combine two tokens into one that is at least as advanced as both:
    /// max version, max global LSN, key-wise max region progress.
    ///
    /// Equal versions require identical region sets
    /// ([`Error::InternalServer`] otherwise). Across different versions the
    /// region sets may legitimately differ; the merge takes the union so no
    /// observed progress is lost.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        let same_version = self.version == other.version;
        if same_version && self.region_progress.len() != other.region_progress.len() {
            return Err(region_set_mismatch(self, other));
        }

        let mut region_progress = self.region_progress.clone();
        for (region, other_lsn) in &other.region_progress {
            match region_progress.entry(*region) {
                Entry::Occupied(mut entry) => {
                    if *entry.get() < *other_lsn {
                        entry.insert(*other_lsn);
                    }
                }
                Entry::Vacant(entry) => {
                    if same_version {
                        return Err(region_set_mismatch(self, other));
                    }
                    entry.insert(*other_lsn);
                }
            }
        }

        Ok(Self {
            version: self.version.max(other.version),
            global_lsn: self.global_lsn.max(other.global_lsn),
            region_progress,
        })
    }
}

impl fmt::Display for VectorSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.version, SEGMENT_SEPARATOR, self.global_lsn)?;
        for (region, local_lsn) in &self.region_progress {
            write!(
                f,
                "{}{}{}{}",
                SEGMENT_SEPARATOR, region, REGION_SEPARATOR, local_lsn
            )?;
        }
        Ok(())
    }
}

fn region_set_mismatch(a: &VectorSessionToken, b: &VectorSessionToken) -> Error {
    Error::internal_server(format!(
        "session tokens at version {} carry different region sets: '{}' vs '{}'",
        a.version, a, b
    ))
}

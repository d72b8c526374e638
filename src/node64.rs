//! `Node64`: a vEB node over the full 64-bit universe, clustered into
//! `Node32` children (spec §4.4).
//!
//! Structurally identical to `Node32` one level up: a `HashMap<u32,
//! Node32>` of clusters keyed directly by high-half id, with a `Node32`
//! summary tracking which high-halves are occupied. This is the top of
//! the stratification — `VebSet` never promotes past this level, so its
//! `universe_size()` matches the original's literal `u64::MAX` rather
//! than a tidy `1 << 64` (which doesn't fit in a `u64` anyway).

use std::collections::HashMap;
use std::mem;

use crate::alloc::AllocTracker;
use crate::error::DeserializeError;
use crate::node32::Node32;
use crate::serialize::{self, Cursor, TAG_NODE32};

struct ClusterData {
    summary: Node32,
    clusters: HashMap<u32, Node32>,
}

fn map_heap_bytes(map: &HashMap<u32, Node32>) -> usize {
    map.capacity() * (mem::size_of::<u32>() + mem::size_of::<Node32>() + 1)
}

#[inline]
fn decompose(x: u64) -> (u32, u32) {
    ((x >> 32) as u32, x as u32)
}

#[inline]
fn index(h: u32, l: u32) -> u64 {
    ((h as u64) << 32) | l as u64
}

/// A vEB node over the full `u64` key space.
pub struct Node64 {
    cluster_data: Option<Box<ClusterData>>,
    min: u64,
    max: u64,
}

impl Node64 {
    pub fn new_singleton(x: u64) -> Self {
        Self {
            cluster_data: None,
            min: x,
            max: x,
        }
    }

    /// Promotes a `Node32` (the old top-level variant) into a freshly
    /// created `Node64`: its min/max lift out, and whatever remains
    /// becomes the sole cluster under high-half 0.
    pub fn from_node32(mut old: Node32, tracker: &mut AllocTracker) -> Self {
        let old_min = old.min();
        let old_max = old.max();
        let old_min_emptied = old.remove(old_min, tracker);
        let old_emptied = if old_min != old_max {
            old.remove(old_max, tracker)
        } else {
            old_min_emptied
        };

        let mut node = Self {
            cluster_data: None,
            min: old_min as u64,
            max: old_max as u64,
        };
        if !old_emptied {
            let mut clusters = HashMap::new();
            clusters.insert(0u32, old);
            let summary = Node32::new_singleton(0);
            tracker.add(mem::size_of::<ClusterData>());
            tracker.add(map_heap_bytes(&clusters));
            node.cluster_data = Some(Box::new(ClusterData { summary, clusters }));
        }
        node
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Matches the original implementation's literal `u64::MAX` rather
    /// than a power-of-two bound (there is no `1u64 << 64`).
    pub fn universe_size() -> u64 {
        u64::MAX
    }

    fn emplace(&mut self, h: u32, l: u32, tracker: &mut AllocTracker) {
        let Some(cd) = self.cluster_data.as_mut() else {
            let mut clusters = HashMap::new();
            clusters.insert(h, Node32::new_singleton(index32(h, l)));
            let summary = Node32::new_singleton(h);
            tracker.add(mem::size_of::<ClusterData>());
            tracker.add(map_heap_bytes(&clusters));
            self.cluster_data = Some(Box::new(ClusterData { summary, clusters }));
            return;
        };

        if let Some(cluster) = cd.clusters.get_mut(&h) {
            cluster.insert(l, tracker);
            return;
        }

        let before = map_heap_bytes(&cd.clusters);
        cd.clusters.insert(h, Node32::new_singleton(index32(h, l)));
        cd.summary.insert(h, tracker);
        let after = map_heap_bytes(&cd.clusters);
        if after > before {
            tracker.add(after - before);
        } else if before > after {
            tracker.sub(before - after);
        }
    }

    pub fn insert(&mut self, mut x: u64, tracker: &mut AllocTracker) {
        if x < self.min {
            mem::swap(&mut x, &mut self.min);
        }
        if x > self.max {
            mem::swap(&mut x, &mut self.max);
        }
        if x == self.min || x == self.max {
            return;
        }
        let (h, l) = decompose(x);
        self.emplace(h, l, tracker);
    }

    pub fn remove(&mut self, mut x: u64, tracker: &mut AllocTracker) -> bool {
        if x == self.min {
            match &self.cluster_data {
                None => {
                    if self.max == self.min {
                        return true;
                    }
                    self.min = self.max;
                    return false;
                }
                Some(cd) => {
                    let min_cluster = cd.summary.min() as u32;
                    let min_element = cd.clusters[&min_cluster].min();
                    x = index(min_cluster, min_element);
                    self.min = x;
                }
            }
        }

        if x == self.max {
            match &self.cluster_data {
                None => {
                    if self.max == self.min {
                        return true;
                    }
                    self.max = self.min;
                    return false;
                }
                Some(cd) => {
                    let max_cluster = cd.summary.max() as u32;
                    let max_element = cd.clusters[&max_cluster].max();
                    x = index(max_cluster, max_element);
                    self.max = x;
                }
            }
        }

        let (h, l) = decompose(x);
        if let Some(cd) = self.cluster_data.as_mut() {
            if let Some(cluster) = cd.clusters.get_mut(&h) {
                if cluster.remove(l, tracker) {
                    let before = map_heap_bytes(&cd.clusters);
                    cd.clusters.remove(&h);
                    let summary_now_empty = cd.summary.remove(h, tracker);
                    let after = map_heap_bytes(&cd.clusters);
                    if before > after {
                        tracker.sub(before - after);
                    }
                    if summary_now_empty {
                        self.destroy(tracker);
                    }
                }
            }
        }

        false
    }

    pub fn contains(&self, x: u64) -> bool {
        if x == self.min || x == self.max {
            return true;
        }
        let (h, l) = decompose(x);
        match &self.cluster_data {
            Some(cd) => cd.clusters.get(&h).map_or(false, |c| c.contains(l)),
            None => false,
        }
    }

    pub fn successor(&self, x: u64) -> Option<u64> {
        if x < self.min {
            return Some(self.min);
        }
        if x >= self.max {
            return None;
        }
        let Some(cd) = &self.cluster_data else {
            return Some(self.max);
        };

        let (h, l) = decompose(x);
        if let Some(cluster) = cd.clusters.get(&h) {
            if l < cluster.max() {
                if let Some(succ) = cluster.successor(l) {
                    return Some(index(h, succ));
                }
            }
        }

        if let Some(succ_h) = cd.summary.successor(h) {
            let min_element = cd.clusters[&succ_h].min();
            return Some(index(succ_h, min_element));
        }

        Some(self.max)
    }

    pub fn predecessor(&self, x: u64) -> Option<u64> {
        if x > self.max {
            return Some(self.max);
        }
        if x <= self.min {
            return None;
        }
        let Some(cd) = &self.cluster_data else {
            return Some(self.min);
        };

        let (h, l) = decompose(x);
        if let Some(cluster) = cd.clusters.get(&h) {
            if l > cluster.min() {
                if let Some(pred) = cluster.predecessor(l) {
                    return Some(index(h, pred));
                }
            }
        }

        if let Some(pred_h) = cd.summary.predecessor(h) {
            let max_element = cd.clusters[&pred_h].max();
            return Some(index(pred_h, max_element));
        }

        Some(self.min)
    }

    pub fn len(&self) -> usize {
        let base = if self.min == self.max { 1 } else { 2 };
        match &self.cluster_data {
            None => base,
            Some(cd) => base + cd.clusters.values().map(|c| c.len()).sum::<usize>(),
        }
    }

    pub fn count_range(&self, lo: u64, hi: u64) -> usize {
        if lo > hi || hi < self.min || lo > self.max {
            return 0;
        }
        let mut count = 0usize;
        if lo <= self.min && self.min <= hi {
            count += 1;
        }
        if self.min != self.max && lo <= self.max && self.max <= hi {
            count += 1;
        }
        let Some(cd) = &self.cluster_data else {
            return count;
        };
        let (lo_h, lo_l) = decompose(lo);
        let (hi_h, hi_l) = decompose(hi);
        let mut h = cd.summary.min();
        loop {
            if h > hi_h {
                break;
            }
            if h >= lo_h {
                let clo = if h == lo_h { lo_l } else { 0 };
                let chi = if h == hi_h { hi_l } else { u32::MAX };
                count += cd.clusters[&h].count_range(clo, chi);
            }
            match cd.summary.successor(h) {
                Some(next) => h = next,
                None => break,
            }
        }
        count
    }

    pub fn destroy(&mut self, tracker: &mut AllocTracker) {
        if let Some(mut cd) = self.cluster_data.take() {
            tracker.sub(map_heap_bytes(&cd.clusters));
            for cluster in cd.clusters.values_mut() {
                cluster.destroy(tracker);
            }
            cd.summary.destroy(tracker);
            tracker.sub(mem::size_of::<ClusterData>());
        }
    }

    pub fn clone_with(&self, tracker: &mut AllocTracker) -> Self {
        let cluster_data = self.cluster_data.as_ref().map(|cd| {
            tracker.add(mem::size_of::<ClusterData>());
            let mut clusters = HashMap::with_capacity(cd.clusters.len());
            for (h, c) in &cd.clusters {
                clusters.insert(*h, c.clone_with(tracker));
            }
            tracker.add(map_heap_bytes(&clusters));
            Box::new(ClusterData {
                summary: cd.summary.clone_with(tracker),
                clusters,
            })
        });
        Self {
            cluster_data,
            min: self.min,
            max: self.max,
        }
    }

    fn full_clusters(&self, tracker: &mut AllocTracker) -> Vec<(u32, Node32)> {
        let mut clusters: Vec<(u32, Node32)> = Vec::new();
        if let Some(cd) = &self.cluster_data {
            let mut h = cd.summary.min();
            loop {
                let cur = h as u32;
                clusters.push((cur, cd.clusters[&cur].clone_with(tracker)));
                match cd.summary.successor(h) {
                    Some(next) => h = next,
                    None => break,
                }
            }
        }
        for v in [self.min, self.max] {
            let (h, l) = decompose(v);
            match clusters.iter_mut().find(|(ch, _)| *ch == h) {
                Some((_, c)) => c.insert(l, tracker),
                None => clusters.push((h, Node32::new_singleton(l))),
            }
        }
        clusters.sort_by_key(|(h, _)| *h);
        clusters
    }

    /// Unions `other` into `self` in place.
    pub fn or_inplace(&mut self, other: &Node64, tracker: &mut AllocTracker) {
        self.insert(other.min, tracker);
        self.insert(other.max, tracker);

        let Some(o_cd) = &other.cluster_data else {
            return;
        };

        if self.cluster_data.is_none() {
            let mut clusters = HashMap::with_capacity(o_cd.clusters.len());
            for (h, c) in &o_cd.clusters {
                clusters.insert(*h, c.clone_with(tracker));
            }
            tracker.add(mem::size_of::<ClusterData>());
            tracker.add(map_heap_bytes(&clusters));
            self.cluster_data = Some(Box::new(ClusterData {
                summary: o_cd.summary.clone_with(tracker),
                clusters,
            }));
            return;
        }

        for (h, o_cluster) in &o_cd.clusters {
            let cd = self.cluster_data.as_mut().unwrap();
            if let Some(existing) = cd.clusters.get_mut(h) {
                existing.or_inplace(o_cluster, tracker);
            } else {
                let before = map_heap_bytes(&cd.clusters);
                cd.clusters.insert(*h, o_cluster.clone_with(tracker));
                cd.summary.insert(*h, tracker);
                let after = map_heap_bytes(&cd.clusters);
                if after > before {
                    tracker.add(after - before);
                }
            }
        }
    }

    /// Intersects `self` with `other` in place. Returns `true` iff the
    /// result is empty (the caller must then delete this node).
    pub fn and_inplace(&mut self, other: &Node64, tracker: &mut AllocTracker) -> bool {
        let i_min = self.min.max(other.min);
        let i_max = self.max.min(other.max);
        let new_min = (i_min <= i_max && self.contains(i_min) && other.contains(i_min)).then_some(i_min);
        let new_max = (i_min <= i_max && self.contains(i_max) && other.contains(i_max)).then_some(i_max);

        let mut surviving: HashMap<u32, Node32> = HashMap::new();
        if let (Some(s_cd), Some(o_cd)) = (&self.cluster_data, &other.cluster_data) {
            for (h, s_cluster) in &s_cd.clusters {
                if let Some(o_cluster) = o_cd.clusters.get(h) {
                    let mut c = s_cluster.clone_with(tracker);
                    if !c.and_inplace(o_cluster, tracker) {
                        surviving.insert(*h, c);
                    } else {
                        c.destroy(tracker);
                    }
                }
            }
        }

        // An endpoint not covered by the anchor candidates has to be pulled
        // up from a surviving cluster, and — per the vEB invariant that
        // min/max never also live inside a cluster — removed from that
        // cluster once pulled, dropping the cluster entirely if it empties.
        let mut derived_min = new_min;
        if derived_min.is_none() {
            if let Some(h) = surviving.keys().min().copied() {
                let cluster = surviving.get_mut(&h).unwrap();
                let elem = cluster.min();
                derived_min = Some(index(h, elem));
                if cluster.remove(elem, tracker) {
                    surviving.remove(&h);
                }
            }
        }
        let mut derived_max = new_max;
        if derived_max.is_none() {
            if let Some(h) = surviving.keys().max().copied() {
                let cluster = surviving.get_mut(&h).unwrap();
                let elem = cluster.max();
                derived_max = Some(index(h, elem));
                if cluster.remove(elem, tracker) {
                    surviving.remove(&h);
                }
            }
        }

        self.destroy(tracker);

        match (derived_min, derived_max) {
            (Some(lo), Some(hi)) => {
                self.min = lo;
                self.max = hi;
                if !surviving.is_empty() {
                    let mut summary: Option<Node32> = None;
                    for h in surviving.keys() {
                        match &mut summary {
                            None => summary = Some(Node32::new_singleton(*h)),
                            Some(s) => s.insert(*h, tracker),
                        }
                    }
                    tracker.add(mem::size_of::<ClusterData>());
                    tracker.add(map_heap_bytes(&surviving));
                    self.cluster_data = Some(Box::new(ClusterData {
                        summary: summary.unwrap(),
                        clusters: surviving,
                    }));
                }
                false
            }
            (Some(v), None) | (None, Some(v)) => {
                self.min = v;
                self.max = v;
                false
            }
            (None, None) => true,
        }
    }

    /// Symmetric-differences `other` into `self` in place. Returns `true`
    /// iff the result is empty (the caller must then delete this node).
    pub fn xor_inplace(&mut self, other: &Node64, tracker: &mut AllocTracker) -> bool {
        let mut sc = self.full_clusters(tracker);
        let mut oc = other.full_clusters(tracker);

        let mut result: Vec<(u32, Node32)> = Vec::with_capacity(sc.len() + oc.len());
        let (mut i, mut j) = (0, 0);
        while i < sc.len() || j < oc.len() {
            let take_left = match (sc.get(i), oc.get(j)) {
                (Some((sh, _)), Some((oh, _))) => *sh < *oh,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => unreachable!(),
            };
            match (sc.get(i), oc.get(j)) {
                (Some((sh, _)), Some((oh, _))) if sh == oh => {
                    let (sh, sleaf) = mem::replace(&mut sc[i], (0, Node32::new_singleton(0)));
                    let (_, oleaf) = &oc[j];
                    let mut c = sleaf;
                    let emptied = c.xor_inplace(oleaf, tracker);
                    if !emptied {
                        result.push((sh, c));
                    } else {
                        c.destroy(tracker);
                    }
                    i += 1;
                    j += 1;
                }
                _ if take_left => {
                    let (sh, sleaf) = mem::replace(&mut sc[i], (0, Node32::new_singleton(0)));
                    result.push((sh, sleaf));
                    i += 1;
                }
                _ => {
                    let (oh, oleaf) = mem::replace(&mut oc[j], (0, Node32::new_singleton(0)));
                    result.push((oh, oleaf));
                    j += 1;
                }
            }
        }

        self.destroy(tracker);

        if result.is_empty() {
            return true;
        }

        let (first_h, first_leaf) = result.first().unwrap();
        let new_min = index(*first_h, first_leaf.min());
        let (last_h, last_leaf) = result.last().unwrap();
        let new_max = index(*last_h, last_leaf.max());

        self.min = new_min;
        self.max = new_max;

        if new_min == new_max {
            return false;
        }

        let (min_h, min_l) = decompose(new_min);
        let (max_h, max_l) = decompose(new_max);
        let mut summary: Option<Node32> = None;
        let mut clusters: HashMap<u32, Node32> = HashMap::new();
        for (h, mut leaf) in result {
            let mut emptied = false;
            if h == min_h {
                emptied = leaf.remove(min_l, tracker);
            }
            if !emptied && h == max_h {
                emptied = leaf.remove(max_l, tracker);
            }
            if !emptied {
                match &mut summary {
                    None => summary = Some(Node32::new_singleton(h)),
                    Some(s) => s.insert(h, tracker),
                }
                clusters.insert(h, leaf);
            } else {
                leaf.destroy(tracker);
            }
        }
        if let Some(summary) = summary {
            if !clusters.is_empty() {
                tracker.add(mem::size_of::<ClusterData>());
                tracker.add(map_heap_bytes(&clusters));
                self.cluster_data = Some(Box::new(ClusterData { summary, clusters }));
            }
        }

        false
    }

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        serialize::write_u64(buf, self.min);
        serialize::write_u64(buf, self.max);
        match &self.cluster_data {
            None => serialize::write_u8(buf, 0),
            Some(cd) => {
                serialize::write_u8(buf, 1);
                let mut keys: Vec<u32> = cd.clusters.keys().copied().collect();
                keys.sort_unstable();
                serialize::write_u64(buf, keys.len() as u64);
                for h in keys {
                    serialize::write_u32(buf, h);
                    serialize::write_u8(buf, TAG_NODE32);
                    cd.clusters[&h].serialize(buf);
                }
            }
        }
    }

    pub fn deserialize(
        cursor: &mut Cursor,
        tracker: &mut AllocTracker,
    ) -> Result<Self, DeserializeError> {
        let min = cursor.read_u64()?;
        let max = cursor.read_u64()?;
        let has_clusters = cursor.read_u8()? != 0;
        let mut node = Self {
            cluster_data: None,
            min,
            max,
        };
        if has_clusters {
            let count = cursor.read_u64()? as usize;
            let mut clusters = HashMap::with_capacity(count);
            let mut summary: Option<Node32> = None;
            for _ in 0..count {
                let h = cursor.read_u32()?;
                let tag = cursor.read_u8()?;
                if tag != TAG_NODE32 {
                    return Err(DeserializeError::UnsupportedTag {
                        tag,
                        offset: cursor.pos(),
                    });
                }
                let cluster = Node32::deserialize(cursor, tracker)?;
                clusters.insert(h, cluster);
                match &mut summary {
                    None => summary = Some(Node32::new_singleton(h)),
                    Some(s) => s.insert(h, tracker),
                }
            }
            if let Some(summary) = summary {
                tracker.add(mem::size_of::<ClusterData>());
                tracker.add(map_heap_bytes(&clusters));
                node.cluster_data = Some(Box::new(ClusterData { summary, clusters }));
            }
        }
        Ok(node)
    }

    pub fn stats(&self) -> (usize, usize, usize) {
        match &self.cluster_data {
            None => (0, 0, 1),
            Some(cd) => {
                let mut total_clusters = cd.clusters.len();
                let mut max_depth = 1;
                let mut total_nodes = 1;
                for c in cd.clusters.values() {
                    let (c_clusters, c_depth, c_nodes) = c.stats();
                    total_clusters += c_clusters;
                    max_depth = max_depth.max(1 + c_depth);
                    total_nodes += c_nodes;
                }
                (total_clusters, max_depth, total_nodes)
            }
        }
    }
}

#[inline]
fn index32(h: u32, l: u32) -> u64 {
    index(h, l)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> AllocTracker {
        AllocTracker::default()
    }

    #[test]
    fn insert_contains_remove() {
        let mut t = tracker();
        let mut n = Node64::new_singleton(10);
        for x in [10_000_000_000u64, 5, 1, 1 << 40] {
            n.insert(x, &mut t);
        }
        assert_eq!(n.min(), 1);
        assert_eq!(n.max(), 1 << 40);
        for x in [10u64, 10_000_000_000, 5, 1, 1 << 40] {
            assert!(n.contains(x));
        }
        assert!(!n.remove(5, &mut t));
        assert!(!n.contains(5));
    }

    #[test]
    fn successor_predecessor_across_clusters() {
        let mut t = tracker();
        let mut n = Node64::new_singleton(100);
        for x in [1u64 << 40, 1_000, 1u64 << 50, 500] {
            n.insert(x, &mut t);
        }
        assert_eq!(n.successor(100), Some(500));
        assert_eq!(n.successor(500), Some(1_000));
        assert_eq!(n.successor(1_000), Some(1 << 40));
        assert_eq!(n.successor(1 << 40), Some(1 << 50));
        assert_eq!(n.successor(1 << 50), None);
    }

    #[test]
    fn promotion_from_node32_preserves_elements() {
        let mut t = tracker();
        let mut n32 = Node32::new_singleton(10);
        for x in [20u32, 100_000, 3_000_000_000] {
            n32.insert(x, &mut t);
        }
        let n64 = Node64::from_node32(n32, &mut t);
        for x in [10u64, 20, 100_000, 3_000_000_000] {
            assert!(n64.contains(x));
        }
        assert_eq!(n64.min(), 10);
        assert_eq!(n64.max(), 3_000_000_000);
    }

    #[test]
    fn universe_size_matches_u64_max() {
        assert_eq!(Node64::universe_size(), u64::MAX);
    }

    #[test]
    fn serialize_roundtrip() {
        let mut t = tracker();
        let mut n = Node64::new_singleton(5);
        for x in [1u64 << 20, 1 << 40, 1 << 60] {
            n.insert(x, &mut t);
        }
        let mut buf = Vec::new();
        n.serialize(&mut buf);
        let mut cursor = Cursor::new(&buf);
        let mut t2 = tracker();
        let back = Node64::deserialize(&mut cursor, &mut t2).unwrap();
        assert_eq!(back.min(), n.min());
        assert_eq!(back.max(), n.max());
        for x in [5u64, 1 << 20, 1 << 40, 1 << 60] {
            assert!(back.contains(x));
        }
    }
}

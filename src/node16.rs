//! `Node16`: a vEB node over a 16-bit universe, clustered into up to 256
//! `Leaf256` children (spec §4.2).
//!
//! The summary and the cluster array are both one level shallower
//! (`Leaf256`), and the cluster array is kept sorted by high-byte so that a
//! cluster's position always equals `summary.rank(high_byte)` — giving O(1)
//! access to a cluster given its high-byte index without a second index
//! structure. The C++ original packs this array as a flexible array member
//! living in the same allocation as the summary; the externally visible
//! requirement (per spec §9) is just O(1) indexed access plus inline
//! storage for the common small-cluster-count case, which `SmallVec`
//! already gives us without hand-rolled pointer arithmetic.

use std::mem;

use smallvec::SmallVec;

use crate::alloc::AllocTracker;
use crate::error::DeserializeError;
use crate::leaf256::Leaf256;
use crate::serialize::{self, Cursor, TAG_NODE8};

/// Clusters below this count live inline in the `Node16` itself; above it
/// they spill onto the heap. Matches the original's observation that most
/// `Node16`s hold only a handful of clusters.
const INLINE_CLUSTERS: usize = 4;

type Clusters = SmallVec<[Leaf256; INLINE_CLUSTERS]>;

struct ClusterData {
    summary: Leaf256,
    clusters: Clusters,
}

fn clusters_heap_bytes(clusters: &Clusters) -> usize {
    if clusters.spilled() {
        clusters.capacity() * mem::size_of::<Leaf256>()
    } else {
        0
    }
}

fn reserve_cluster_slot(clusters: &mut Clusters, tracker: &mut AllocTracker) {
    if clusters.len() < clusters.capacity() {
        return;
    }
    let before = clusters_heap_bytes(clusters);
    let cap = clusters.capacity();
    let new_cap = (cap + cap / 4 + 1).min(256);
    clusters.reserve_exact(new_cap - clusters.len());
    let after = clusters_heap_bytes(clusters);
    if after > before {
        tracker.add(after - before);
    }
}

#[inline]
fn decompose(x: u16) -> (u8, u8) {
    ((x >> 8) as u8, x as u8)
}

#[inline]
fn index(h: u8, l: u8) -> u16 {
    ((h as u16) << 8) | l as u16
}

/// A vEB node over keys `0..=65535`.
pub struct Node16 {
    cluster_data: Option<Box<ClusterData>>,
    /// High-half key this node is filed under when it is itself a cluster
    /// of a parent `Node32`. Unused (left at 0) for a top-level node.
    pub(crate) key: u16,
    min: u16,
    max: u16,
}

impl Node16 {
    /// A node holding the single element `index(key, lo)`, filed under
    /// `key` in whatever parent it ends up a cluster of (0 if top-level).
    pub fn new_singleton(key: u16, lo: u16) -> Self {
        Self {
            cluster_data: None,
            key,
            min: lo,
            max: lo,
        }
    }

    /// Promotes a `Leaf256` (the old top-level variant) into a freshly
    /// created `Node16`: the leaf's min/max become the node's lazily
    /// propagated min/max, and whatever remains becomes the node's single
    /// cluster under high-byte 0.
    pub fn from_leaf256(mut old: Leaf256, tracker: &mut AllocTracker) -> Self {
        let old_min = old.min().expect("promoting an empty Leaf256");
        let old_max = old.max().expect("promoting an empty Leaf256");
        old.remove(old_min);
        if old_min != old_max {
            old.remove(old_max);
        }

        let mut node = Self {
            cluster_data: None,
            key: 0,
            min: old_min as u16,
            max: old_max as u16,
        };
        if !old.is_empty() {
            let mut clusters = Clusters::new();
            clusters.push(old);
            node.cluster_data = Some(Box::new(ClusterData {
                summary: Leaf256::singleton(0),
                clusters,
            }));
            tracker.add(mem::size_of::<ClusterData>());
        }
        node
    }

    pub fn key(&self) -> u16 {
        self.key
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn universe_size() -> u32 {
        1 << 16
    }

    fn emplace(&mut self, h: u8, l: u8, tracker: &mut AllocTracker) {
        let Some(cd) = self.cluster_data.as_mut() else {
            let mut clusters = Clusters::new();
            clusters.push(Leaf256::singleton(l));
            self.cluster_data = Some(Box::new(ClusterData {
                summary: Leaf256::singleton(h),
                clusters,
            }));
            tracker.add(mem::size_of::<ClusterData>());
            return;
        };

        if cd.summary.contains(h) {
            let idx = cd.summary.rank(h) as usize;
            cd.clusters[idx].insert(l);
            return;
        }

        let idx = cd.summary.rank(h) as usize;
        reserve_cluster_slot(&mut cd.clusters, tracker);
        cd.clusters.insert(idx, Leaf256::singleton(l));
        cd.summary.insert(h);
    }

    pub fn insert(&mut self, mut x: u16, tracker: &mut AllocTracker) {
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

    /// Removes `x`. Returns `true` iff the whole node is now empty (the
    /// caller must then delete this node from whatever owns it).
    pub fn remove(&mut self, mut x: u16, tracker: &mut AllocTracker) -> bool {
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
                    let min_cluster = cd.summary.min().expect("summary set but empty");
                    let min_element = cd.clusters[0].min().expect("cluster set but empty");
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
                    let max_cluster = cd.summary.max().expect("summary set but empty");
                    let idx = cd.summary.rank(max_cluster) as usize;
                    let max_element = cd.clusters[idx].max().expect("cluster set but empty");
                    x = index(max_cluster, max_element);
                    self.max = x;
                }
            }
        }

        let (h, l) = decompose(x);
        if let Some(cd) = self.cluster_data.as_mut() {
            if cd.summary.contains(h) {
                let idx = cd.summary.rank(h) as usize;
                if cd.clusters[idx].remove(l) {
                    cd.clusters.remove(idx);
                    let summary_now_empty = cd.summary.remove(h);
                    if summary_now_empty {
                        self.destroy(tracker);
                    }
                }
            }
        }

        false
    }

    pub fn contains(&self, x: u16) -> bool {
        if x == self.min || x == self.max {
            return true;
        }
        let (h, l) = decompose(x);
        match &self.cluster_data {
            Some(cd) if cd.summary.contains(h) => {
                let idx = cd.summary.rank(h) as usize;
                cd.clusters[idx].contains(l)
            }
            _ => false,
        }
    }

    pub fn successor(&self, x: u16) -> Option<u16> {
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
        if cd.summary.contains(h) {
            let idx = cd.summary.rank(h) as usize;
            let cluster = &cd.clusters[idx];
            if let Some(cm) = cluster.max() {
                if l < cm {
                    if let Some(succ) = cluster.successor(l) {
                        return Some(index(h, succ));
                    }
                }
            }
        }

        if let Some(succ_h) = cd.summary.successor(h) {
            let idx = cd.summary.rank(succ_h) as usize;
            let min_element = cd.clusters[idx].min().expect("cluster set but empty");
            return Some(index(succ_h, min_element));
        }

        Some(self.max)
    }

    pub fn predecessor(&self, x: u16) -> Option<u16> {
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
        if cd.summary.contains(h) {
            let idx = cd.summary.rank(h) as usize;
            let cluster = &cd.clusters[idx];
            if let Some(cmin) = cluster.min() {
                if l > cmin {
                    if let Some(pred) = cluster.predecessor(l) {
                        return Some(index(h, pred));
                    }
                }
            }
        }

        if let Some(pred_h) = cd.summary.predecessor(h) {
            let idx = cd.summary.rank(pred_h) as usize;
            let max_element = cd.clusters[idx].max().expect("cluster set but empty");
            return Some(index(pred_h, max_element));
        }

        Some(self.min)
    }

    pub fn len(&self) -> usize {
        let base = if self.min == self.max { 1 } else { 2 };
        match &self.cluster_data {
            None => base,
            Some(cd) => {
                base + cd
                    .clusters
                    .iter()
                    .map(|c| c.len() as usize)
                    .sum::<usize>()
            }
        }
    }

    pub fn count_range(&self, lo: u16, hi: u16) -> usize {
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
        // Walk every present cluster from the summary's minimum, skipping
        // anything below lo_h and stopping once past hi_h.
        let mut h = cd.summary.min();
        while let Some(cur) = h {
            if cur > hi_h {
                break;
            }
            if cur >= lo_h {
                let idx = cd.summary.rank(cur) as usize;
                let cluster = &cd.clusters[idx];
                let clo = if cur == lo_h { lo_l } else { 0 };
                let chi = if cur == hi_h { hi_l } else { 255 };
                count += cluster.count_range(clo, chi) as usize;
            }
            h = cd.summary.successor(cur);
        }
        count
    }

    pub fn destroy(&mut self, tracker: &mut AllocTracker) {
        if let Some(cd) = self.cluster_data.take() {
            tracker.sub(clusters_heap_bytes(&cd.clusters));
            tracker.sub(mem::size_of::<ClusterData>());
        }
    }

    pub fn clone_with(&self, tracker: &mut AllocTracker) -> Self {
        let cluster_data = self.cluster_data.as_ref().map(|cd| {
            tracker.add(mem::size_of::<ClusterData>());
            tracker.add(clusters_heap_bytes(&cd.clusters));
            Box::new(ClusterData {
                summary: cd.summary,
                clusters: cd.clusters.clone(),
            })
        });
        Self {
            cluster_data,
            key: self.key,
            min: self.min,
            max: self.max,
        }
    }

    /// Unions `other` into `self` in place.
    pub fn or_inplace(&mut self, other: &Node16, tracker: &mut AllocTracker) {
        self.insert(other.min, tracker);
        self.insert(other.max, tracker);

        let Some(o_cd) = &other.cluster_data else {
            return;
        };

        if self.cluster_data.is_none() {
            tracker.add(mem::size_of::<ClusterData>());
            tracker.add(clusters_heap_bytes(&o_cd.clusters));
            self.cluster_data = Some(Box::new(ClusterData {
                summary: o_cd.summary,
                clusters: o_cd.clusters.clone(),
            }));
            return;
        }

        let s_cd = self.cluster_data.as_ref().unwrap();
        let mut merged_summary = s_cd.summary;
        merged_summary.or_inplace(&o_cd.summary);

        let mut new_clusters: Clusters = Clusters::new();
        let mut h = merged_summary.min();
        while let Some(cur) = h {
            let in_s = s_cd.summary.contains(cur);
            let in_o = o_cd.summary.contains(cur);
            let merged = match (in_s, in_o) {
                (true, true) => {
                    let mut c = s_cd.clusters[s_cd.summary.rank(cur) as usize];
                    c.or_inplace(&o_cd.clusters[o_cd.summary.rank(cur) as usize]);
                    c
                }
                (true, false) => s_cd.clusters[s_cd.summary.rank(cur) as usize],
                (false, true) => o_cd.clusters[o_cd.summary.rank(cur) as usize],
                (false, false) => unreachable!("merged summary bit with neither side set"),
            };
            new_clusters.push(merged);
            h = merged_summary.successor(cur);
        }

        let old_heap = clusters_heap_bytes(&self.cluster_data.as_ref().unwrap().clusters);
        let new_heap = clusters_heap_bytes(&new_clusters);
        self.cluster_data.as_mut().unwrap().summary = merged_summary;
        self.cluster_data.as_mut().unwrap().clusters = new_clusters;
        if new_heap > old_heap {
            tracker.add(new_heap - old_heap);
        } else if old_heap > new_heap {
            tracker.sub(old_heap - new_heap);
        }
    }

    /// Intersects `self` with `other` in place. Returns `true` iff the
    /// result is empty (the caller must then delete this node).
    pub fn and_inplace(&mut self, other: &Node16, tracker: &mut AllocTracker) -> bool {
        let i_min = self.min.max(other.min);
        let i_max = self.max.min(other.max);
        let new_min = (i_min <= i_max && self.contains(i_min) && other.contains(i_min)).then_some(i_min);
        let new_max = (i_min <= i_max && self.contains(i_max) && other.contains(i_max)).then_some(i_max);

        let finish = |this: &mut Self, tracker: &mut AllocTracker| -> bool {
            this.destroy(tracker);
            match (new_min, new_max) {
                (Some(lo), Some(hi)) => {
                    this.min = lo;
                    this.max = hi;
                    false
                }
                (Some(v), None) | (None, Some(v)) => {
                    this.min = v;
                    this.max = v;
                    false
                }
                (None, None) => true,
            }
        };

        if i_min >= i_max || self.cluster_data.is_none() || other.cluster_data.is_none() {
            return finish(self, tracker);
        }

        let s_cd = self.cluster_data.as_ref().unwrap();
        let o_cd = other.cluster_data.as_ref().unwrap();
        let mut int_summary = s_cd.summary;
        int_summary.and_inplace(&o_cd.summary);
        if int_summary.is_empty() {
            return finish(self, tracker);
        }

        let mut surviving: Clusters = Clusters::new();
        let mut h = int_summary.min();
        while let Some(cur) = h {
            let s_idx = s_cd.summary.rank(cur) as usize;
            let o_idx = o_cd.summary.rank(cur) as usize;
            let mut c = s_cd.clusters[s_idx];
            c.and_inplace(&o_cd.clusters[o_idx]);
            if !c.is_empty() {
                surviving.push(c);
            } else {
                int_summary.remove(cur);
            }
            h = int_summary.successor(cur);
        }

        // When an endpoint isn't one of the two anchor candidates, it must be
        // pulled up from a surviving cluster — and, per the vEB invariant
        // that min/max are never also stored in a cluster, removed from
        // that cluster once pulled (mirroring the original's
        // `min_ = ...; int_cluster.remove(min_)` / same for `max_`).
        let mut derived_min = new_min;
        if derived_min.is_none() {
            if let Some(h) = int_summary.min() {
                let idx = int_summary.rank(h) as usize;
                let elem = surviving[idx].min().expect("surviving cluster is empty");
                derived_min = Some(index(h, elem));
                if surviving[idx].remove(elem) {
                    surviving.remove(idx);
                    int_summary.remove(h);
                }
            }
        }
        let mut derived_max = new_max;
        if derived_max.is_none() {
            if let Some(h) = int_summary.max() {
                let idx = int_summary.rank(h) as usize;
                let elem = surviving[idx].max().expect("surviving cluster is empty");
                derived_max = Some(index(h, elem));
                if surviving[idx].remove(elem) {
                    surviving.remove(idx);
                    int_summary.remove(h);
                }
            }
        }

        let old_heap = clusters_heap_bytes(&s_cd.clusters);
        let new_heap = clusters_heap_bytes(&surviving);

        match (derived_min, derived_max) {
            (Some(lo), Some(hi)) => {
                self.min = lo;
                self.max = hi;
                if surviving.is_empty() {
                    self.destroy(tracker);
                } else {
                    self.cluster_data.as_mut().unwrap().summary = int_summary;
                    self.cluster_data.as_mut().unwrap().clusters = surviving;
                    if new_heap > old_heap {
                        tracker.add(new_heap - old_heap);
                    } else if old_heap > new_heap {
                        tracker.sub(old_heap - new_heap);
                    }
                }
                false
            }
            (Some(v), None) | (None, Some(v)) => {
                self.destroy(tracker);
                self.min = v;
                self.max = v;
                false
            }
            (None, None) => {
                self.destroy(tracker);
                true
            }
        }
    }

    /// Every element this node holds, as a sorted list of (high-byte,
    /// cluster) pairs with `min`/`max` folded back into cluster storage.
    /// Used by [`Self::xor_inplace`], where the lazy min/max anchors need
    /// to participate in per-bit cancellation like any other element.
    fn full_clusters(&self) -> Vec<(u8, Leaf256)> {
        let mut clusters: Vec<(u8, Leaf256)> = Vec::new();
        if let Some(cd) = &self.cluster_data {
            let mut h = cd.summary.min();
            while let Some(cur) = h {
                let idx = cd.summary.rank(cur) as usize;
                clusters.push((cur, cd.clusters[idx]));
                h = cd.summary.successor(cur);
            }
        }
        for v in [self.min, self.max] {
            let (h, l) = decompose(v);
            match clusters.iter_mut().find(|(ch, _)| *ch == h) {
                Some((_, c)) => c.insert(l),
                None => clusters.push((h, Leaf256::singleton(l))),
            }
        }
        clusters.sort_by_key(|(h, _)| *h);
        clusters
    }

    /// Symmetric-differences `other` into `self` in place. Returns `true`
    /// iff the result is empty (the caller must then delete this node).
    pub fn xor_inplace(&mut self, other: &Node16, tracker: &mut AllocTracker) -> bool {
        let sc = self.full_clusters();
        let oc = other.full_clusters();

        let mut result: Vec<(u8, Leaf256)> = Vec::with_capacity(sc.len() + oc.len());
        let (mut i, mut j) = (0, 0);
        while i < sc.len() || j < oc.len() {
            match (sc.get(i), oc.get(j)) {
                (Some((sh, sleaf)), Some((oh, oleaf))) if sh < oh => {
                    result.push((*sh, *sleaf));
                    i += 1;
                }
                (Some((sh, sleaf)), Some((oh, oleaf))) if sh > oh => {
                    result.push((*oh, *oleaf));
                    j += 1;
                }
                (Some((sh, sleaf)), Some((_, oleaf))) => {
                    let mut c = *sleaf;
                    c.xor_inplace(oleaf);
                    if !c.is_empty() {
                        result.push((*sh, c));
                    }
                    i += 1;
                    j += 1;
                }
                (Some((sh, sleaf)), None) => {
                    result.push((*sh, *sleaf));
                    i += 1;
                }
                (None, Some((oh, oleaf))) => {
                    result.push((*oh, *oleaf));
                    j += 1;
                }
                (None, None) => unreachable!(),
            }
        }

        self.destroy(tracker);

        if result.is_empty() {
            return true;
        }

        let (first_h, first_leaf) = result.first().unwrap();
        let new_min = index(*first_h, first_leaf.min().expect("cluster entry is empty"));
        let (last_h, last_leaf) = result.last().unwrap();
        let new_max = index(*last_h, last_leaf.max().expect("cluster entry is empty"));

        self.min = new_min;
        self.max = new_max;

        if new_min == new_max {
            return false;
        }

        let (min_h, min_l) = decompose(new_min);
        let (max_h, max_l) = decompose(new_max);
        let mut summary = Leaf256::empty();
        let mut clusters: Clusters = Clusters::new();
        for (h, mut leaf) in result {
            if h == min_h {
                leaf.remove(min_l);
            }
            if h == max_h {
                leaf.remove(max_l);
            }
            if !leaf.is_empty() {
                summary.insert(h);
                clusters.push(leaf);
            }
        }
        if !clusters.is_empty() {
            tracker.add(mem::size_of::<ClusterData>());
            tracker.add(clusters_heap_bytes(&clusters));
            self.cluster_data = Some(Box::new(ClusterData { summary, clusters }));
        }

        false
    }

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        serialize::write_u16(buf, self.min);
        serialize::write_u16(buf, self.max);
        match &self.cluster_data {
            None => serialize::write_u8(buf, 0),
            Some(cd) => {
                serialize::write_u8(buf, 1);
                let count = cd.clusters.len() as u16;
                serialize::write_u16(buf, count);
                cd.summary.serialize(buf);
                for cluster in &cd.clusters {
                    serialize::write_u8(buf, TAG_NODE8);
                    cluster.serialize(buf);
                }
            }
        }
    }

    pub fn deserialize(
        cursor: &mut Cursor,
        tracker: &mut AllocTracker,
    ) -> Result<Self, DeserializeError> {
        let min = cursor.read_u16()?;
        let max = cursor.read_u16()?;
        let has_clusters = cursor.read_u8()? != 0;
        let mut node = Self {
            cluster_data: None,
            key: 0,
            min,
            max,
        };
        if has_clusters {
            let count = cursor.read_u16()? as usize;
            let summary = Leaf256::deserialize(cursor)?;
            let mut clusters = Clusters::with_capacity(count);
            for _ in 0..count {
                let tag = cursor.read_u8()?;
                if tag != TAG_NODE8 {
                    return Err(DeserializeError::UnsupportedTag {
                        tag,
                        offset: cursor.pos(),
                    });
                }
                clusters.push(Leaf256::deserialize(cursor)?);
            }
            tracker.add(mem::size_of::<ClusterData>());
            tracker.add(clusters_heap_bytes(&clusters));
            node.cluster_data = Some(Box::new(ClusterData { summary, clusters }));
        }
        Ok(node)
    }

    pub fn stats(&self) -> (usize, usize, usize) {
        // (total_clusters, max_depth, total_nodes)
        match &self.cluster_data {
            None => (0, 0, 1),
            Some(cd) => (cd.clusters.len(), 1, 1 + cd.clusters.len()),
        }
    }
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
        let mut n = Node16::new_singleton(0, 10);
        n.insert(20, &mut t);
        n.insert(30, &mut t);
        assert!(n.contains(10));
        assert!(n.contains(20));
        assert!(n.contains(30));
        assert_eq!(n.min(), 10);
        assert_eq!(n.max(), 30);
        assert_eq!(n.len(), 3);

        assert!(!n.remove(20, &mut t));
        assert!(!n.contains(20));
        assert_eq!(n.len(), 2);
        assert_eq!(n.successor(10), Some(30));
    }

    #[test]
    fn successor_predecessor_across_clusters() {
        let mut t = tracker();
        let mut n = Node16::new_singleton(0, 100);
        for x in [10_000u16, 1_000, 40_000, 500] {
            n.insert(x, &mut t);
        }
        assert_eq!(n.successor(100), Some(500));
        assert_eq!(n.successor(500), Some(1_000));
        assert_eq!(n.successor(1_000), Some(10_000));
        assert_eq!(n.successor(10_000), Some(40_000));
        assert_eq!(n.successor(40_000), None);
        assert_eq!(n.predecessor(40_000), Some(10_000));
        assert_eq!(n.predecessor(100), None);
    }

    #[test]
    fn remove_to_empty_signals_caller() {
        let mut t = tracker();
        let mut n = Node16::new_singleton(0, 10);
        assert!(n.remove(10, &mut t));
    }

    #[test]
    fn dense_cluster_promotion_from_leaf() {
        let mut t = tracker();
        let mut leaf = Leaf256::empty();
        for x in 0u16..256 {
            leaf.insert(x as u8);
        }
        let mut n = Node16::from_leaf256(leaf, &mut t);
        n.insert(256, &mut t);
        assert_eq!(n.len(), 257);
        assert_eq!(n.min(), 0);
        assert_eq!(n.max(), 256);
        for x in 0u16..257 {
            assert!(n.contains(x), "missing {x}");
        }
    }

    #[test]
    fn or_and_xor_basics() {
        let mut t = tracker();
        let mut a = Node16::new_singleton(0, 0);
        for x in 1u16..50 {
            a.insert(x, &mut t);
        }
        let mut b = Node16::new_singleton(0, 25);
        for x in 26u16..75 {
            b.insert(x, &mut t);
        }

        let mut union = Node16::new_singleton(0, a.min());
        union.cluster_data = a.cluster_data.as_ref().map(|cd| {
            Box::new(ClusterData {
                summary: cd.summary,
                clusters: cd.clusters.clone(),
            })
        });
        union.min = a.min;
        union.max = a.max;
        union.or_inplace(&b, &mut t);
        assert_eq!(union.len(), 75);

        let mut inter = Node16::new_singleton(0, a.min());
        inter.cluster_data = a.cluster_data.as_ref().map(|cd| {
            Box::new(ClusterData {
                summary: cd.summary,
                clusters: cd.clusters.clone(),
            })
        });
        inter.min = a.min;
        inter.max = a.max;
        let empty = inter.and_inplace(&b, &mut t);
        assert!(!empty);
        assert_eq!(inter.len(), 25);
    }

    #[test]
    fn serialize_roundtrip() {
        let mut t = tracker();
        let mut n = Node16::new_singleton(0, 5);
        for x in [1000u16, 2000, 3000, 40000] {
            n.insert(x, &mut t);
        }
        let mut buf = Vec::new();
        n.serialize(&mut buf);
        let mut cursor = Cursor::new(&buf);
        let mut t2 = tracker();
        let back = Node16::deserialize(&mut cursor, &mut t2).unwrap();
        assert_eq!(back.min(), n.min());
        assert_eq!(back.max(), n.max());
        assert_eq!(back.len(), n.len());
        for x in [5u16, 1000, 2000, 3000, 40000] {
            assert!(back.contains(x));
        }
    }
}

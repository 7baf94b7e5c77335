//! Binary-search queries over onset-sorted time intervals.
//!
//! Two flavours share the same lookups:
//!
//! - [`DisjointIndex`] assumes no two intervals overlap, so every point query
//!   is a single binary search.
//! - [`OverlappingIndex`] allows overlap. Point and range queries anchor with a
//!   binary search and then scan backwards; a prefix maximum of offsets stops
//!   the scan once nothing earlier can reach the query point. Dense overlap
//!   still degrades to O(n).
//!
//! Both are read-only views. Results are indices into the viewed sequence.
//! Feeding an unsorted sequence (or overlapping intervals to the disjoint
//! index) gives unspecified answers.

use std::ops::Range;

/// Something with a start and end time, in beats.
pub trait Interval {
    fn onset(&self) -> f64;
    fn offset(&self) -> f64;

    /// Half-open containment: `onset <= t < offset`.
    fn contains(&self, t: f64) -> bool {
        self.onset() <= t && t < self.offset()
    }
}

/// An indexable sequence of intervals.
///
/// Implemented for slices of [`Interval`]s and for views that resolve
/// handles through another store (see `container::PitchLane`).
pub trait IntervalSeq {
    fn len(&self) -> usize;
    fn onset_at(&self, index: usize) -> f64;
    fn offset_at(&self, index: usize) -> f64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Interval> IntervalSeq for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn onset_at(&self, index: usize) -> f64 {
        self[index].onset()
    }

    fn offset_at(&self, index: usize) -> f64 {
        self[index].offset()
    }
}

impl<T: Interval> IntervalSeq for Vec<T> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn onset_at(&self, index: usize) -> f64 {
        self[index].onset()
    }

    fn offset_at(&self, index: usize) -> f64 {
        self[index].offset()
    }
}

/// First index in `0..len` where `pred` turns false (pred must hold on a prefix).
fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

fn first_after<S: IntervalSeq + ?Sized>(seq: &S, t: f64) -> Option<usize> {
    let i = partition_point(seq.len(), |i| seq.onset_at(i) <= t);
    (i < seq.len()).then_some(i)
}

/// Lookups over sorted, pairwise disjoint intervals.
#[derive(Debug, Clone, Copy)]
pub struct DisjointIndex<'a, S: ?Sized> {
    seq: &'a S,
}

impl<'a, S: IntervalSeq + ?Sized> DisjointIndex<'a, S> {
    pub fn new(seq: &'a S) -> Self {
        Self { seq }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Smallest index whose onset is strictly after `t`.
    pub fn first_after(&self, t: f64) -> Option<usize> {
        first_after(self.seq, t)
    }

    /// Largest index whose offset is strictly before `t`.
    pub fn last_before(&self, t: f64) -> Option<usize> {
        partition_point(self.seq.len(), |i| self.seq.offset_at(i) < t).checked_sub(1)
    }

    /// The interval containing `t`, if any.
    pub fn at(&self, t: f64) -> Option<usize> {
        let i = partition_point(self.seq.len(), |i| self.seq.onset_at(i) <= t).checked_sub(1)?;
        (t < self.seq.offset_at(i)).then_some(i)
    }

    /// The containing interval, else whichever neighbour has the closer edge.
    /// Equal distances go to the earlier interval.
    pub fn nearest(&self, t: f64) -> Option<usize> {
        if let Some(i) = self.at(t) {
            return Some(i);
        }

        let next = partition_point(self.seq.len(), |i| self.seq.onset_at(i) <= t);
        let prev = next.checked_sub(1);
        let has_next = next < self.seq.len();

        match (prev, has_next) {
            (Some(p), true) => {
                let before = t - self.seq.offset_at(p);
                let after = self.seq.onset_at(next) - t;
                Some(if before <= after { p } else { next })
            }
            (Some(p), false) => Some(p),
            (None, true) => Some(next),
            (None, false) => None,
        }
    }

    /// Indices of intervals overlapping `[start, end)`.
    pub fn range(&self, start: f64, end: f64) -> Range<usize> {
        let first = partition_point(self.seq.len(), |i| self.seq.offset_at(i) <= start);
        let last = partition_point(self.seq.len(), |i| self.seq.onset_at(i) < end);
        first..last.max(first)
    }
}

/// Lookups over sorted intervals that may overlap each other.
#[derive(Debug, Clone)]
pub struct OverlappingIndex<'a, S: ?Sized> {
    seq: &'a S,
    /// `reach[i]` = latest offset among intervals `0..=i`.
    reach: Vec<f64>,
}

impl<'a, S: IntervalSeq + ?Sized> OverlappingIndex<'a, S> {
    pub fn new(seq: &'a S) -> Self {
        let mut reach = Vec::with_capacity(seq.len());
        let mut latest = f64::NEG_INFINITY;
        for i in 0..seq.len() {
            latest = latest.max(seq.offset_at(i));
            reach.push(latest);
        }
        Self { seq, reach }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Smallest index whose onset is strictly after `t`.
    pub fn first_after(&self, t: f64) -> Option<usize> {
        first_after(self.seq, t)
    }

    /// Largest index whose offset is strictly before `t`.
    pub fn last_before(&self, t: f64) -> Option<usize> {
        // Anything starting at or after t also ends at or after t.
        let anchor = partition_point(self.seq.len(), |i| self.seq.onset_at(i) < t);
        (0..anchor).rev().find(|&i| self.seq.offset_at(i) < t)
    }

    /// Every interval containing `t`, in ascending index order.
    pub fn at(&self, t: f64) -> Vec<usize> {
        let anchor = partition_point(self.seq.len(), |i| self.seq.onset_at(i) <= t);
        self.scan_back(anchor, |i| self.seq.offset_at(i) > t, t)
    }

    /// Every interval overlapping `[start, end)`, in ascending index order.
    pub fn range(&self, start: f64, end: f64) -> Vec<usize> {
        let anchor = partition_point(self.seq.len(), |i| self.seq.onset_at(i) < end);
        self.scan_back(anchor, |i| self.seq.offset_at(i) > start, start)
    }

    fn scan_back(&self, anchor: usize, keep: impl Fn(usize) -> bool, floor: f64) -> Vec<usize> {
        let mut hits = Vec::new();
        for i in (0..anchor).rev() {
            if self.reach[i] <= floor {
                break;
            }
            if keep(i) {
                hits.push(i);
            }
        }
        hits.reverse();
        hits
    }
}

use super::datum::{Datum, DELTA_NOW};
use crate::util::now_nanos;
use crate::{FossilError, FossilResult};
use std::cmp::Ordering;

/// Maximum number of datums held by one segment.
pub const SEGMENT_SIZE: usize = 10_000;

/// A bounded, ordered container of datums keyed by time-delta.
///
/// `head_time` is the absolute timestamp of the first appended datum and
/// never changes once set. Deltas are monotonically non-decreasing because
/// appends always record "now".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Segment {
    head_time: i64,
    datums: Vec<Datum>,
}

impl Segment {
    /// A fresh, empty segment anchored at `head_time`.
    pub fn new(head_time: i64) -> Self {
        Self {
            head_time,
            datums: Vec::new(),
        }
    }

    /// Absolute timestamp of this segment's first datum.
    pub fn head_time(&self) -> i64 {
        self.head_time
    }

    pub fn len(&self) -> usize {
        self.datums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datums.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.datums.len() == SEGMENT_SIZE
    }

    pub fn datums(&self) -> &[Datum] {
        &self.datums
    }

    /// Appends a datum, resolving the `-1` delta sentinel to
    /// `now - head_time`. Fails with [`FossilError::SegmentFull`] at
    /// capacity.
    pub fn append(&mut self, mut datum: Datum) -> FossilResult<()> {
        if self.is_full() {
            return Err(FossilError::SegmentFull);
        }
        if datum.delta == DELTA_NOW {
            datum.delta = now_nanos() - self.head_time;
        }
        self.datums.push(datum);
        Ok(())
    }

    /// Approximate lookup: the index of the datum whose delta is closest to
    /// `target_time - head_time`, ties broken toward the lower index. A
    /// target preceding `head_time` yields 0.
    pub fn find_approx(&self, target_time: i64) -> usize {
        if self.datums.is_empty() {
            return 0;
        }
        let target = target_time - self.head_time;
        if target <= self.datums[0].delta {
            return 0;
        }
        self.nearest(0, self.datums.len() - 1, target)
    }

    // Recursive binary search over the inclusive index range [lo, hi].
    fn nearest(&self, lo: usize, hi: usize, target: i64) -> usize {
        if lo == hi {
            return lo;
        }
        if hi - lo == 1 {
            let below = (self.datums[lo].delta - target).abs();
            let above = (self.datums[hi].delta - target).abs();
            return if above < below { hi } else { lo };
        }
        let mid = lo + (hi - lo) / 2;
        match self.datums[mid].delta.cmp(&target) {
            Ordering::Equal => mid,
            Ordering::Less => self.nearest(mid, hi, target),
            Ordering::Greater => self.nearest(lo, mid, target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_with_deltas(deltas: &[i64]) -> Segment {
        let mut segment = Segment::new(1_000);
        for &delta in deltas {
            segment
                .append(Datum {
                    delta,
                    topic_id: 0,
                    data: Vec::new(),
                })
                .unwrap();
        }
        segment
    }

    #[test]
    fn append_fills_to_capacity() {
        let mut segment = Segment::new(0);
        for i in 0..SEGMENT_SIZE {
            segment
                .append(Datum {
                    delta: i as i64,
                    topic_id: 0,
                    data: Vec::new(),
                })
                .unwrap();
        }
        assert!(segment.is_full());
        assert!(matches!(
            segment.append(Datum::now(0, Vec::new())),
            Err(FossilError::SegmentFull)
        ));
    }

    #[test]
    fn sentinel_delta_resolves_to_now() {
        let head = now_nanos();
        let mut segment = Segment::new(head);
        segment.append(Datum::now(0, Vec::new())).unwrap();
        let delta = segment.datums()[0].delta;
        assert!(delta >= 0, "delta {delta} should be non-negative");
    }

    #[test]
    fn find_approx_picks_nearest() {
        let segment = segment_with_deltas(&[0, 10, 20, 30, 40]);
        // head_time is 1_000, so absolute times are 1_000 + delta
        assert_eq!(segment.find_approx(1_000), 0);
        assert_eq!(segment.find_approx(500), 0, "before head time");
        assert_eq!(segment.find_approx(1_020), 2);
        assert_eq!(segment.find_approx(1_024), 2);
        assert_eq!(segment.find_approx(1_026), 3);
        assert_eq!(segment.find_approx(9_999_999), 4);
    }

    #[test]
    fn find_approx_ties_go_low() {
        let segment = segment_with_deltas(&[0, 10]);
        // 1_005 is equidistant from both; the lower index wins
        assert_eq!(segment.find_approx(1_005), 0);
    }
}

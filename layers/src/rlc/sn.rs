//! Sequence Number Space
//!
//! Modulo arithmetic over an SN field of configurable width. Every window
//! comparison in the RLC entities goes through [`SnSpace`]; SNs are never
//! compared as raw integers.

/// Sequence numbers of a `bits` wide SN field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnSpace {
    bits: u8,
}

impl SnSpace {
    /// Create the SN space of a `bits` wide field (1..=31)
    pub const fn new(bits: u8) -> Self {
        assert!(bits >= 1 && bits <= 31, "SN field width out of range");
        Self { bits }
    }

    /// Width of the SN field in bits
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Number of distinct SNs, 2^w
    pub fn cardinality(&self) -> u32 {
        1 << self.bits
    }

    /// Window size, 2^(w-1)
    pub fn window_size(&self) -> u32 {
        1 << (self.bits - 1)
    }

    fn mask(&self) -> u32 {
        self.cardinality() - 1
    }

    /// Whether `sn` fits in the field
    pub fn is_valid(&self, sn: u32) -> bool {
        sn <= self.mask()
    }

    /// `sn + delta` modulo 2^w
    pub fn add(&self, sn: u32, delta: u32) -> u32 {
        sn.wrapping_add(delta) & self.mask()
    }

    /// `sn - delta` modulo 2^w
    pub fn sub(&self, sn: u32, delta: u32) -> u32 {
        sn.wrapping_sub(delta) & self.mask()
    }

    /// Forward distance from `a` to `b`, always below 2^w
    pub fn distance(&self, a: u32, b: u32) -> u32 {
        b.wrapping_sub(a) & self.mask()
    }

    /// Whether `sn` lies in `[lower, lower + size)` modulo 2^w
    pub fn in_window(&self, sn: u32, lower: u32, size: u32) -> bool {
        self.distance(lower, sn) < size
    }

    /// Iterate the SNs of `[from, to)` in forward order
    pub fn range(&self, from: u32, to: u32) -> impl Iterator<Item = u32> {
        let space = *self;
        (0..self.distance(from, to)).map(move |i| space.add(from, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTHS: [u8; 3] = [6, 12, 18];

    #[test]
    fn test_cardinality_and_window() {
        assert_eq!(SnSpace::new(6).cardinality(), 64);
        assert_eq!(SnSpace::new(6).window_size(), 32);
        assert_eq!(SnSpace::new(12).window_size(), 2048);
        assert_eq!(SnSpace::new(18).cardinality(), 262144);
    }

    #[test]
    fn test_full_cycle_returns_to_start() {
        for bits in WIDTHS {
            let space = SnSpace::new(bits);
            for sn in 0..space.cardinality() {
                assert_eq!(space.add(sn, space.cardinality()), sn);
                assert_eq!(space.distance(sn, sn), 0);
                assert_eq!(space.sub(space.add(sn, 1), 1), sn);
            }
        }
    }

    #[test]
    fn test_distance_is_monotonic_forward() {
        for bits in WIDTHS {
            let space = SnSpace::new(bits);
            for base in [0, 1, space.window_size(), space.cardinality() - 1] {
                let mut previous = 0;
                for step in 1..space.cardinality() {
                    let d = space.distance(base, space.add(base, step));
                    assert_eq!(d, step);
                    assert!(d > previous);
                    previous = d;
                }
            }
        }
    }

    #[test]
    fn test_wraparound_boundary() {
        for bits in WIDTHS {
            let space = SnSpace::new(bits);
            let last = space.cardinality() - 1;
            assert_eq!(space.add(last, 1), 0);
            assert_eq!(space.sub(0, 1), last);
            assert_eq!(space.distance(last, 0), 1);
            assert_eq!(space.distance(0, last), last);
            assert!(space.in_window(0, last, 2));
            assert!(space.in_window(last, last, 1));
            assert!(!space.in_window(1, last, 2));
        }
    }

    #[test]
    fn test_in_window_half_space() {
        let space = SnSpace::new(6);
        let ws = space.window_size();
        // [60, 60 + 32) wraps to 27
        assert!(space.in_window(60, 60, ws));
        assert!(space.in_window(3, 60, ws));
        assert!(space.in_window(27, 60, ws));
        assert!(!space.in_window(28, 60, ws));
        assert!(!space.in_window(59, 60, ws));
    }

    #[test]
    fn test_range_wraps() {
        let space = SnSpace::new(6);
        let sns: Vec<u32> = space.range(62, 2).collect();
        assert_eq!(sns, vec![62, 63, 0, 1]);
        assert_eq!(space.range(5, 5).count(), 0);
    }

    #[test]
    fn test_is_valid() {
        let space = SnSpace::new(12);
        assert!(space.is_valid(4095));
        assert!(!space.is_valid(4096));
    }
}

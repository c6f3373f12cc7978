use easy_ext::ext;

#[ext(UsizeExt)]
pub impl usize {
    /// Ceiling of the binary logarithm. `0` and `1` both map to `0`.
    #[inline]
    #[must_use]
    fn ilog2_ceil(self) -> u32 {
        self.checked_next_power_of_two()
            .map_or(Self::BITS, Self::trailing_zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ilog2_ceil_rounds_up_between_powers_of_two() {
        assert_eq!(0_usize.ilog2_ceil(), 0);
        assert_eq!(1_usize.ilog2_ceil(), 0);
        assert_eq!(2_usize.ilog2_ceil(), 1);
        assert_eq!(3_usize.ilog2_ceil(), 2);
        assert_eq!(4_usize.ilog2_ceil(), 2);
        assert_eq!(5_usize.ilog2_ceil(), 3);
        assert_eq!(1024_usize.ilog2_ceil(), 10);
        assert_eq!(1025_usize.ilog2_ceil(), 11);
    }
}

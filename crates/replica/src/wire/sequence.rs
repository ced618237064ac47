/// An incoming sequence is stale when it equals the last applied one or
/// trails it by less than `window`. Larger gaps are taken as wraparound.
#[inline]
pub fn is_stale(incoming: u32, last_applied: u32, window: u32) -> bool {
    last_applied.wrapping_sub(incoming) < window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_window() {
        assert!(is_stale(10, 10, 65536));
        assert!(is_stale(9, 10, 65536));
        assert!(!is_stale(11, 10, 65536));
        assert!(!is_stale(0, 100_000, 65536));
        assert!(!is_stale(2, u32::MAX - 3, 65536));
        assert!(is_stale(u32::MAX - 3, 2, 65536));
    }

    #[test]
    fn next_sequence_after_wrap_is_fresh() {
        assert!(!is_stale(0, u32::MAX, 65536));
        assert!(is_stale(u32::MAX, 0, 65536));
    }
}

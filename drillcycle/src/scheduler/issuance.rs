//! Halving issuance schedule.

/// Default issuance of cycle 1.
pub const DEFAULT_GENESIS_ISSUANCE: u64 = 1_000;

/// Default number of cycles per halving epoch.
pub const DEFAULT_EPOCH_LENGTH: u64 = 10_000;

/// Halving epoch of a cycle: `floor((n - 1) / epoch_length)`.
pub fn epoch_of(cycle_number: u64, epoch_length: u64) -> u64 {
    if epoch_length == 0 {
        return 0;
    }
    cycle_number.saturating_sub(1) / epoch_length
}

/// Issuance of a cycle: `max(1, floor(genesis / 2^epoch))`.
pub fn issuance(cycle_number: u64, genesis: u64, epoch_length: u64) -> u64 {
    let epoch = epoch_of(cycle_number, epoch_length);
    let halved = if epoch >= u64::BITS as u64 {
        0
    } else {
        genesis >> epoch
    };
    halved.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_epoch_pays_genesis() {
        assert_eq!(issuance(1, 1_000, 100), 1_000);
        assert_eq!(issuance(100, 1_000, 100), 1_000);
    }

    #[test]
    fn test_halves_at_epoch_boundary() {
        assert_eq!(issuance(101, 1_000, 100), 500);
        assert_eq!(issuance(201, 1_000, 100), 250);
        assert_eq!(issuance(301, 1_000, 100), 125);
        assert_eq!(issuance(401, 1_000, 100), 62);
    }

    #[test]
    fn test_never_below_one() {
        assert_eq!(issuance(100_000, 1_000, 100), 1);
        assert_eq!(issuance(u64::MAX, 1_000, 1), 1);
        assert_eq!(issuance(1, 0, 100), 1);
    }

    #[test]
    fn test_epoch_numbers() {
        assert_eq!(epoch_of(1, 10), 0);
        assert_eq!(epoch_of(10, 10), 0);
        assert_eq!(epoch_of(11, 10), 1);
        assert_eq!(epoch_of(5, 0), 0);
    }
}

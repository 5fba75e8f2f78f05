//! 频率换算
//!
//! 所有时钟域之间的换算都经过 [`convert_frequency`]，
//! 使用 128 位中间值计算 `floor(value * to / from)`，不会溢出。

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;
pub const MICROS_PER_SECOND: u64 = 1_000_000;
pub const MILLIS_PER_SECOND: u64 = 1_000;

/// 把 `from_hz` 时钟域中的计数换算到 `to_hz` 时钟域
///
/// # 参数
/// - `value`: 源时钟域计数
/// - `from_hz`: 源频率，为 0 时视为未初始化，结果为 0
/// - `to_hz`: 目标频率
///
/// # 返回值
/// 向下取整的目标计数，超出 `u64` 时饱和
#[inline]
pub fn convert_frequency(value: u64, from_hz: u64, to_hz: u64) -> u64 {
    if from_hz == to_hz {
        return value;
    }
    if from_hz == 0 {
        return 0;
    }
    let scaled = (value as u128 * to_hz as u128) / from_hz as u128;
    scaled.min(u64::MAX as u128) as u64
}

#[inline]
pub fn nanos_to_ticks(nanos: u64, frequency: u64) -> u64 {
    convert_frequency(nanos, NANOS_PER_SECOND, frequency)
}

#[inline]
pub fn ticks_to_nanos(ticks: u64, frequency: u64) -> u64 {
    convert_frequency(ticks, frequency, NANOS_PER_SECOND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_frequency_is_identity() {
        assert_eq!(convert_frequency(12345, 1000, 1000), 12345);
        assert_eq!(convert_frequency(u64::MAX, 7, 7), u64::MAX);
    }

    #[test]
    fn test_integer_ratios() {
        // 100 MHz -> 1 MHz
        assert_eq!(convert_frequency(1_000_000, 100_000_000, 1_000_000), 10_000);
        // 1 MHz -> 100 MHz
        assert_eq!(convert_frequency(3, 1_000_000, 100_000_000), 300);
        // 向下取整
        assert_eq!(convert_frequency(199, 100, 1), 1);
    }

    #[test]
    fn test_non_integer_ratio() {
        // 3 Hz -> 2 Hz
        assert_eq!(convert_frequency(10, 3, 2), 6);
        assert_eq!(convert_frequency(72_000_000, 72_000_000, 100_000_000), 100_000_000);
    }

    #[test]
    fn test_no_overflow() {
        assert_eq!(
            convert_frequency(u64::MAX / 2, 1, 4),
            u64::MAX,
            "saturates instead of wrapping"
        );
        assert_eq!(convert_frequency(u64::MAX, 100_000_000, 1_000_000_000), u64::MAX);
    }

    #[test]
    fn test_zero_source_frequency() {
        assert_eq!(convert_frequency(500, 0, 1000), 0);
    }

    #[test]
    fn test_nanos_round_trip_at_tick_frequency() {
        let f = 100_000_000;
        assert_eq!(nanos_to_ticks(100, f), 10);
        assert_eq!(ticks_to_nanos(10, f), 100);
        assert_eq!(ticks_to_nanos(nanos_to_ticks(1_000_000, f), f), 1_000_000);
    }
}

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;

/// Points per lock for 1..=4 cleared rows, multiplied by the current level.
pub const LINE_CLEAR_POINTS: [u64; 4] = [40, 100, 300, 1200];
pub const LINES_PER_LEVEL: u32 = 10;

pub const RATE_LIMIT_CAPACITY: u32 = 10;
pub const RATE_LIMIT_WINDOW_MS: u64 = 1_000;

pub const SNAPSHOT_TTL_SECS: u64 = 3_600;
pub const SNAPSHOT_KEY_PREFIX: &str = "gameState:";
pub const SNAPSHOT_QUEUE_CAPACITY: usize = 1_024;

pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

const LEVEL_DROP_INTERVALS_MS: [u64; 30] = [
    800, 717, 633, 550, 467, 383, 300, 217, 133, 100, 83, 83, 83, 67, 67, 67, 50, 50, 50, 33, 33,
    33, 33, 33, 33, 33, 33, 33, 33, 17,
];

pub fn snapshot_key(session_id: &str) -> String {
    format!("{SNAPSHOT_KEY_PREFIX}{session_id}")
}

pub fn level_for_lines(lines: u32) -> u32 {
    lines / LINES_PER_LEVEL + 1
}

pub fn line_clear_points(cleared: usize, level: u32) -> u64 {
    if cleared == 0 {
        return 0;
    }
    let base = LINE_CLEAR_POINTS[cleared.min(LINE_CLEAR_POINTS.len()) - 1];
    base * level as u64
}

pub fn gravity_interval_ms(level: u32) -> u64 {
    let index = (level.max(1) - 1) as usize;
    LEVEL_DROP_INTERVALS_MS[index.min(LEVEL_DROP_INTERVALS_MS.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_advances_every_ten_lines() {
        assert_eq!(level_for_lines(0), 1);
        assert_eq!(level_for_lines(9), 1);
        assert_eq!(level_for_lines(10), 2);
        assert_eq!(level_for_lines(25), 3);
    }

    #[test]
    fn line_clear_points_scale_with_level() {
        assert_eq!(line_clear_points(0, 3), 0);
        assert_eq!(line_clear_points(1, 1), 40);
        assert_eq!(line_clear_points(2, 2), 200);
        assert_eq!(line_clear_points(3, 1), 300);
        assert_eq!(line_clear_points(4, 3), 3_600);
    }

    #[test]
    fn gravity_interval_clamps_to_table() {
        assert_eq!(gravity_interval_ms(0), 800);
        assert_eq!(gravity_interval_ms(1), 800);
        assert_eq!(gravity_interval_ms(10), 100);
        assert_eq!(gravity_interval_ms(30), 17);
        assert_eq!(gravity_interval_ms(99), 17);
    }

    #[test]
    fn snapshot_key_uses_session_prefix() {
        assert_eq!(snapshot_key("abc"), "gameState:abc");
    }
}

/// 设备侧基础状态码（状态 CSV 的 Status 列取值）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapBasicStatusCode {
    Ready = 1,
    Running = 2,
    Error = 3,
    Idle = 4,
    Pause = 5,
    Manual = 6,
    TestRunning = 7,
}

impl MapBasicStatusCode {
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Ready),
            2 => Some(Self::Running),
            3 => Some(Self::Error),
            4 => Some(Self::Idle),
            5 => Some(Self::Pause),
            6 => Some(Self::Manual),
            7 => Some(Self::TestRunning),
            _ => None,
        }
    }
}

/// 将设备基础状态码映射为 CFX 数值状态；未知或缺失映射为 -1。
pub fn cfx_state_code(status: Option<i32>) -> i32 {
    let Some(code) = status.and_then(MapBasicStatusCode::from_i32) else {
        return -1;
    };
    match code {
        MapBasicStatusCode::Ready => 2000,
        MapBasicStatusCode::Running => 1000,
        MapBasicStatusCode::Error => 5000,
        MapBasicStatusCode::Idle => 2200,
        MapBasicStatusCode::Pause => 2100,
        MapBasicStatusCode::Manual => 2300,
        MapBasicStatusCode::TestRunning => 4600,
    }
}

#[cfg(test)]
mod tests {
    use super::{cfx_state_code, MapBasicStatusCode};

    #[test]
    fn basic_codes_map_to_cfx_codes() {
        assert_eq!(cfx_state_code(Some(1)), 2000);
        assert_eq!(cfx_state_code(Some(2)), 1000);
        assert_eq!(cfx_state_code(Some(3)), 5000);
        assert_eq!(cfx_state_code(Some(4)), 2200);
        assert_eq!(cfx_state_code(Some(5)), 2100);
        assert_eq!(cfx_state_code(Some(6)), 2300);
        assert_eq!(cfx_state_code(Some(7)), 4600);
    }

    #[test]
    fn unknown_or_missing_maps_to_negative_one() {
        assert_eq!(cfx_state_code(None), -1);
        assert_eq!(cfx_state_code(Some(0)), -1);
        assert_eq!(cfx_state_code(Some(99)), -1);
    }

    #[test]
    fn error_code_round_trips() {
        assert_eq!(MapBasicStatusCode::from_i32(3), Some(MapBasicStatusCode::Error));
        assert_eq!(MapBasicStatusCode::Error as i32, 3);
    }
}

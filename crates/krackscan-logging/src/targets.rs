//! Target names shared by every krackscan subsystem, so a `RUST_LOG`
//! directive or a subsystem log file can select one of them.

/// Control channel traffic (emitted through `log` by `krackscan-ctrl`)
pub const T_CTRL: &str = "krackscan::ctrl";
/// Capture and injection on the monitor interface
pub const T_WIFI: &str = "krackscan::wifi";
/// Client classification and verdicts
pub const T_DETECT: &str = "krackscan::detect";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_crates_log_under_shared_names() {
        assert_eq!(krackscan_ctrl::LOG_TARGET, T_CTRL);
        #[cfg(target_os = "linux")]
        assert_eq!(krackscan_wireless::LOG_TARGET, T_WIFI);
    }
}

/// What a line from the device tells us about the last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAck {
    DoorOpenConfirmed,
    DoorOpenSimulating,
    TimeSyncConfirmed,
    Unrecognized,
}

pub const DOOR_OPEN_CONFIRMED: &str = "OK: Door Open";
pub const DOOR_OPEN_SIMULATING: &str = "Simulating Door Open...";
pub const TIME_SYNC_CONFIRMED: &str = "Time Sync:";

impl DeviceAck {
    pub fn classify(line: &str) -> Self {
        if line.contains(DOOR_OPEN_CONFIRMED) {
            DeviceAck::DoorOpenConfirmed
        } else if line.contains(DOOR_OPEN_SIMULATING) {
            DeviceAck::DoorOpenSimulating
        } else if line.contains(TIME_SYNC_CONFIRMED) {
            DeviceAck::TimeSyncConfirmed
        } else {
            DeviceAck::Unrecognized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_device_lines() {
        assert_eq!(DeviceAck::classify("OK: Door Open"), DeviceAck::DoorOpenConfirmed);
        assert_eq!(DeviceAck::classify("Simulating Door Open..."), DeviceAck::DoorOpenSimulating);
        assert_eq!(DeviceAck::classify("Time Sync: 09:05"), DeviceAck::TimeSyncConfirmed);
        assert_eq!(DeviceAck::classify("Date is the same."), DeviceAck::Unrecognized);
        assert_eq!(DeviceAck::classify(""), DeviceAck::Unrecognized);
    }
}

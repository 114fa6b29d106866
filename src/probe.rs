//! Wi-Fi access point readings
//!
//! The platform sensor is behind [`NetworkProbe`]; hosts plug in their own
//! implementation. Readings that cannot identify an access point are
//! classified here so the ledger never compares against them.

use async_trait::async_trait;

/// Placeholder the platform reports when location access is withheld
pub const BROADCAST_PLACEHOLDER: &str = "02:00:00:00:00:00";

/// Sentinel reported when no network information is available
pub const UNKNOWN_SENTINEL: &str = "unknown";

/// The access point the device is associated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub network_name: String,
    pub hardware_id: String,
}

impl AccessPoint {
    /// Platforms report SSIDs wrapped in double quotes; they are stripped.
    pub fn new(network_name: &str, hardware_id: &str) -> Self {
        Self {
            network_name: network_name.replace('"', ""),
            hardware_id: hardware_id.to_string(),
        }
    }

    /// The unknown reading
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_SENTINEL, UNKNOWN_SENTINEL)
    }

    /// Whether the hardware id identifies an actual access point
    pub fn is_usable(&self) -> bool {
        !is_unusable_hardware_id(&self.hardware_id)
    }
}

/// Result of asking the sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReading {
    Associated(AccessPoint),
    /// The location / Wi-Fi permission has not been granted
    PermissionDenied,
    /// Radio off or not associated
    Unavailable,
}

impl ProbeReading {
    /// The hardware id to submit, or the unknown sentinel
    pub fn hardware_id(&self) -> String {
        match self {
            ProbeReading::Associated(ap) => ap.hardware_id.clone(),
            _ => UNKNOWN_SENTINEL.to_string(),
        }
    }
}

/// Source of access point readings
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn current_access_point(&self) -> ProbeReading;
}

/// Trim and lowercase a hardware id before any comparison
pub fn normalize_hardware_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Empty, the broadcast placeholder and the unknown sentinel carry no location
pub fn is_unusable_hardware_id(raw: &str) -> bool {
    let normalized = normalize_hardware_id(raw);
    normalized.is_empty() || normalized == BROADCAST_PLACEHOLDER || normalized == UNKNOWN_SENTINEL
}

/// A probe that always returns the same reading
#[derive(Debug, Clone)]
pub struct StaticProbe {
    reading: ProbeReading,
}

impl StaticProbe {
    pub fn new(reading: ProbeReading) -> Self {
        Self { reading }
    }

    pub fn associated(network_name: &str, hardware_id: &str) -> Self {
        Self::new(ProbeReading::Associated(AccessPoint::new(
            network_name,
            hardware_id,
        )))
    }
}

#[async_trait]
impl NetworkProbe for StaticProbe {
    async fn current_access_point(&self) -> ProbeReading {
        self.reading.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_hardware_id("  AA:BB:CC:DD:EE:FF\n"), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn classifies_unusable_readings() {
        assert!(is_unusable_hardware_id(""));
        assert!(is_unusable_hardware_id("   "));
        assert!(is_unusable_hardware_id("02:00:00:00:00:00"));
        assert!(is_unusable_hardware_id(" 02:00:00:00:00:00 "));
        assert!(is_unusable_hardware_id("Unknown"));
        assert!(!is_unusable_hardware_id("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn strips_ssid_quotes() {
        let ap = AccessPoint::new("\"Campus-Lab3\"", "aa:bb:cc:dd:ee:ff");
        assert_eq!(ap.network_name, "Campus-Lab3");
        assert!(ap.is_usable());
        assert!(!AccessPoint::unknown().is_usable());
    }

    #[tokio::test]
    async fn static_probe_reports_reading() {
        let probe = StaticProbe::new(ProbeReading::PermissionDenied);
        let reading = probe.current_access_point().await;
        assert_eq!(reading, ProbeReading::PermissionDenied);
        assert_eq!(reading.hardware_id(), UNKNOWN_SENTINEL);
    }
}

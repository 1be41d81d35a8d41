//! Browser fingerprint profiles.

use super::tls::TlsFingerprint;

/// Browser fingerprint profile for impersonation.
///
/// The catalog is closed: four labels, loaded once at startup and
/// read-only for the process lifetime. `ALL` doubles as the round-robin
/// rotation order used by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FingerprintProfile {
    /// Chrome 120 on Windows.
    #[default]
    Chrome120,
    /// Firefox 121 on Windows.
    Firefox121,
    /// Edge 120 on Windows.
    Edge120,
    /// Safari 17.2 on macOS.
    Safari17,
}

impl FingerprintProfile {
    /// All profiles in rotation order.
    pub const ALL: [FingerprintProfile; 4] = [
        FingerprintProfile::Chrome120,
        FingerprintProfile::Firefox121,
        FingerprintProfile::Edge120,
        FingerprintProfile::Safari17,
    ];

    /// Stable label used in logs, adaptive state, and config fingerprints.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Chrome120 => "chrome120",
            Self::Firefox121 => "firefox121",
            Self::Edge120 => "edge120",
            Self::Safari17 => "safari17",
        }
    }

    /// Resolve a label back to its profile. Total over the four labels.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "chrome120" => Some(Self::Chrome120),
            "firefox121" => Some(Self::Firefox121),
            "edge120" => Some(Self::Edge120),
            "safari17" => Some(Self::Safari17),
            _ => None,
        }
    }

    /// Ordered labels, rotation order.
    pub fn labels() -> [&'static str; 4] {
        [
            Self::Chrome120.label(),
            Self::Firefox121.label(),
            Self::Edge120.label(),
            Self::Safari17.label(),
        ]
    }

    /// User-Agent string matching this profile.
    pub fn user_agent(&self) -> &'static str {
        match self {
            Self::Chrome120 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            }
            Self::Firefox121 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0"
            }
            Self::Edge120 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0"
            }
            Self::Safari17 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15"
            }
        }
    }

    /// TLS handshake surface for this profile.
    pub fn tls(&self) -> TlsFingerprint {
        match self {
            Self::Chrome120 => TlsFingerprint::chrome_120(),
            Self::Firefox121 => TlsFingerprint::firefox_121(),
            Self::Edge120 => TlsFingerprint::edge_120(),
            Self::Safari17 => TlsFingerprint::safari_17(),
        }
    }
}

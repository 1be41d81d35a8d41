//! Per-browser TLS handshake surfaces.
//!
//! Cipher, curve, and signature-scheme orderings reproduce what each
//! browser version is known to advertise. TLS 1.3 AEAD suites always lead,
//! followed by the ECDHE suites; the long-deprecated CBC suites are never
//! offered. Extension-ID order is kept for reference even though Chromium
//! derivatives permute extensions at handshake time.

/// Chrome 120 cipher suites in advertised order.
pub const CHROME_120_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
];

/// Firefox 121 cipher suites. Firefox ranks ChaCha20 above AES-256 and its
/// ECDHE ChaCha suites above the AES-256 ones.
pub const FIREFOX_121_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
];

/// Edge 120 cipher suites. Chromium ordering without the ChaCha ECDHE pair.
pub const EDGE_120_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
];

/// Safari 17 cipher suites. Safari prefers AES-256 over AES-128 in its
/// ECDHE block.
pub const SAFARI_17_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
];

/// Chromium-family curve preferences. BoringSSL names: "X25519", "P-256",
/// "P-384", "P-521".
pub const CHROMIUM_CURVES: &[&str] = &["X25519", "P-256", "P-384"];

/// Firefox and Safari additionally offer P-521.
pub const EXTENDED_CURVES: &[&str] = &["X25519", "P-256", "P-384", "P-521"];

/// Chromium-family signature schemes (Chrome 120, Edge 120, Safari 17
/// advertise the same prefix order).
pub const CHROMIUM_SIGNATURE_SCHEMES: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Firefox signature schemes: all ECDSA first, then PSS, then PKCS#1.
pub const FIREFOX_SIGNATURE_SCHEMES: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "ecdsa_secp384r1_sha384",
    "ecdsa_secp521r1_sha512",
    "rsa_pss_rsae_sha256",
    "rsa_pss_rsae_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha256",
    "rsa_pkcs1_sha384",
    "rsa_pkcs1_sha512",
];

/// Edge/Safari trim the SHA-512 RSA schemes.
pub const SHORT_SIGNATURE_SCHEMES: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
];

/// Extension IDs in Chromium order (SNI first, key-share block last).
pub const CHROMIUM_EXTENSION_IDS: &[u16] = &[0, 10, 11, 13, 16, 23, 27, 35, 43, 45, 51];

/// Firefox/Edge extension IDs (no ALPS).
pub const GECKO_EXTENSION_IDS: &[u16] = &[0, 10, 11, 13, 23, 27, 35, 43, 45, 51];

/// Safari extension IDs; renegotiation_info (0xff01) trails.
pub const SAFARI_EXTENSION_IDS: &[u16] = &[0, 10, 11, 13, 23, 27, 35, 43, 45, 51, 65281];

/// ALPN offered by every catalog profile.
pub const DEFAULT_ALPN: &[&str] = &["h2", "http/1.1"];

/// TLS fingerprint configuration applied to the connector.
#[derive(Debug, Clone)]
pub struct TlsFingerprint {
    /// Cipher suites in order.
    pub cipher_list: Vec<&'static str>,
    /// Supported curves/groups.
    pub curves: Vec<&'static str>,
    /// Signature algorithms.
    pub sigalgs: Vec<&'static str>,
    /// ALPN protocols in preference order.
    pub alpn: Vec<&'static str>,
    /// Extension order (reference for JA3-style identification).
    pub extension_order: Vec<u16>,
    /// Enable GREASE values. Firefox does not send GREASE.
    pub grease: bool,
}

impl TlsFingerprint {
    pub fn chrome_120() -> Self {
        Self {
            cipher_list: CHROME_120_CIPHER_SUITES.to_vec(),
            curves: CHROMIUM_CURVES.to_vec(),
            sigalgs: CHROMIUM_SIGNATURE_SCHEMES.to_vec(),
            alpn: DEFAULT_ALPN.to_vec(),
            extension_order: CHROMIUM_EXTENSION_IDS.to_vec(),
            grease: true,
        }
    }

    pub fn firefox_121() -> Self {
        Self {
            cipher_list: FIREFOX_121_CIPHER_SUITES.to_vec(),
            curves: EXTENDED_CURVES.to_vec(),
            sigalgs: FIREFOX_SIGNATURE_SCHEMES.to_vec(),
            alpn: DEFAULT_ALPN.to_vec(),
            extension_order: GECKO_EXTENSION_IDS.to_vec(),
            grease: false,
        }
    }

    pub fn edge_120() -> Self {
        Self {
            cipher_list: EDGE_120_CIPHER_SUITES.to_vec(),
            curves: CHROMIUM_CURVES.to_vec(),
            sigalgs: SHORT_SIGNATURE_SCHEMES.to_vec(),
            alpn: DEFAULT_ALPN.to_vec(),
            extension_order: GECKO_EXTENSION_IDS.to_vec(),
            grease: true,
        }
    }

    pub fn safari_17() -> Self {
        Self {
            cipher_list: SAFARI_17_CIPHER_SUITES.to_vec(),
            curves: EXTENDED_CURVES.to_vec(),
            sigalgs: SHORT_SIGNATURE_SCHEMES.to_vec(),
            alpn: DEFAULT_ALPN.to_vec(),
            extension_order: SAFARI_EXTENSION_IDS.to_vec(),
            grease: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_suites_lead_every_profile() {
        for fp in [
            TlsFingerprint::chrome_120(),
            TlsFingerprint::firefox_121(),
            TlsFingerprint::edge_120(),
            TlsFingerprint::safari_17(),
        ] {
            assert_eq!(fp.cipher_list[0], "TLS_AES_128_GCM_SHA256");
            assert!(fp.cipher_list[1].starts_with("TLS_"));
            assert!(!fp.cipher_list[1].contains("ECDHE"));
            assert!(!fp.cipher_list[2].contains("ECDHE"));
        }
    }

    #[test]
    fn no_cbc_suites_anywhere() {
        for fp in [
            TlsFingerprint::chrome_120(),
            TlsFingerprint::firefox_121(),
            TlsFingerprint::edge_120(),
            TlsFingerprint::safari_17(),
        ] {
            assert!(fp.cipher_list.iter().all(|c| !c.contains("CBC")));
        }
    }

    #[test]
    fn curves_start_with_x25519() {
        for fp in [
            TlsFingerprint::chrome_120(),
            TlsFingerprint::firefox_121(),
            TlsFingerprint::edge_120(),
            TlsFingerprint::safari_17(),
        ] {
            assert_eq!(fp.curves[0], "X25519");
        }
    }

    #[test]
    fn firefox_skips_grease() {
        assert!(!TlsFingerprint::firefox_121().grease);
        assert!(TlsFingerprint::chrome_120().grease);
    }
}

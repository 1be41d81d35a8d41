//! Browser TLS fingerprint catalog.

pub mod profiles;
pub mod tls;

pub use profiles::FingerprintProfile;
pub use tls::TlsFingerprint;

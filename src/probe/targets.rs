//! Reachability targets and their metadata replies.
//!
//! The first two targets answer with JSON describing the connection as the
//! far side saw it; the rest are reachability-only. Probing every endpoint
//! against the same fixed list keeps scores comparable across the fleet.

use serde::Deserialize;

/// How a target's response body is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Body is JSON carrying client IP and network metadata.
    JsonMeta,
    /// Only the status code matters.
    Reachability,
}

/// One probe destination.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget {
    pub url: &'static str,
    pub host: &'static str,
    pub path: &'static str,
    pub kind: TargetKind,
}

/// Fixed probe targets, in probing order.
pub const PROBE_TARGETS: [ProbeTarget; 5] = [
    ProbeTarget {
        url: "https://ipp.nscl.ir",
        host: "ipp.nscl.ir",
        path: "/",
        kind: TargetKind::JsonMeta,
    },
    ProbeTarget {
        url: "https://speed.cloudflare.com/meta",
        host: "speed.cloudflare.com",
        path: "/meta",
        kind: TargetKind::JsonMeta,
    },
    ProbeTarget {
        url: "https://www.gstatic.com/generate_204",
        host: "www.gstatic.com",
        path: "/generate_204",
        kind: TargetKind::Reachability,
    },
    ProbeTarget {
        url: "https://connectivitycheck.gstatic.com/generate_204",
        host: "connectivitycheck.gstatic.com",
        path: "/generate_204",
        kind: TargetKind::Reachability,
    },
    ProbeTarget {
        url: "https://detectportal.firefox.com/success.txt",
        host: "detectportal.firefox.com",
        path: "/success.txt",
        kind: TargetKind::Reachability,
    },
];

/// Metadata parsed from a JSON target reply. Every field is optional; the
/// worker-style replies flatten Cloudflare's `cf` object into the top
/// level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeMeta {
    #[serde(rename = "clientIp")]
    pub client_ip: Option<String>,
    #[serde(rename = "asOrganization")]
    pub as_organization: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub asn: Option<serde_json::Value>,
}

impl ProbeMeta {
    /// Parse a JSON body, tolerating unknown fields.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    /// ASN as a display string regardless of the JSON type used.
    pub fn asn_string(&self) -> Option<String> {
        match &self.asn {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_order_is_fixed() {
        assert_eq!(PROBE_TARGETS[0].host, "ipp.nscl.ir");
        assert_eq!(PROBE_TARGETS[1].host, "speed.cloudflare.com");
        assert_eq!(PROBE_TARGETS[4].host, "detectportal.firefox.com");
        assert_eq!(
            PROBE_TARGETS
                .iter()
                .filter(|t| t.kind == TargetKind::JsonMeta)
                .count(),
            2
        );
    }

    #[test]
    fn meta_parses_worker_reply() {
        let body = br#"{"clientIp":"203.0.113.9","asOrganization":"Cloudflare, Inc.","city":"Frankfurt","region":"Hesse","country":"DE","asn":13335}"#;
        let meta = ProbeMeta::from_body(body).unwrap();
        assert_eq!(meta.client_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.as_organization.as_deref(), Some("Cloudflare, Inc."));
        assert_eq!(meta.country.as_deref(), Some("DE"));
        assert_eq!(meta.asn_string().as_deref(), Some("13335"));
    }

    #[test]
    fn meta_tolerates_missing_fields() {
        let meta = ProbeMeta::from_body(b"{}").unwrap();
        assert!(meta.client_ip.is_none());
        assert!(ProbeMeta::from_body(b"not json").is_none());
    }
}

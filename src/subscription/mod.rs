//! Subscription config model.
//!
//! A [`ClientConfig`] is a value object describing one client-side tunnel
//! setting across the supported protocol families. The
//! (protocol, transport, security) triple is validated at construction;
//! nothing else in the crate can produce an unsupported combination.

pub mod links;
pub mod synthesis;
pub mod tester;

use std::fmt;

use crate::error::{Error, Result};

/// Tunnel protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Hysteria2,
    Tuic,
}

impl Protocol {
    pub const ALL: [Protocol; 6] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Trojan,
        Protocol::Shadowsocks,
        Protocol::Hysteria2,
        Protocol::Tuic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Tuic => "tuic",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream transport carried under the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Ws,
    Grpc,
    H2,
    Xhttp,
    HttpUpgrade,
    Quic,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Ws => "ws",
            Transport::Grpc => "grpc",
            Transport::H2 => "h2",
            Transport::Xhttp => "xhttp",
            Transport::HttpUpgrade => "httpupgrade",
            Transport::Quic => "quic",
            Transport::Udp => "udp",
        }
    }

    /// Short form used in remarks.
    pub fn short_name(&self) -> &'static str {
        match self {
            Transport::Tcp => "TCP",
            Transport::Ws => "WS",
            Transport::Grpc => "gRPC",
            Transport::H2 => "H2",
            Transport::Xhttp => "xHTTP",
            Transport::HttpUpgrade => "HTTPUp",
            Transport::Quic => "QUIC",
            Transport::Udp => "UDP",
        }
    }

    /// HTTP-shaped transports that carry a host and path.
    pub fn uses_host_path(&self) -> bool {
        matches!(
            self,
            Transport::Ws | Transport::Xhttp | Transport::HttpUpgrade | Transport::H2
        )
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security layer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Security {
    None,
    Tls,
    Xtls,
    Reality,
}

impl Security {
    pub fn as_str(&self) -> &'static str {
        match self {
            Security::None => "none",
            Security::Tls => "tls",
            Security::Xtls => "xtls",
            Security::Reality => "reality",
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a (protocol, transport, security) triple is supported.
pub fn combination_allowed(protocol: Protocol, transport: Transport, security: Security) -> bool {
    use Protocol::*;
    use Security::*;
    use Transport::*;

    match protocol {
        Vmess => {
            matches!(transport, Tcp | Ws | Grpc | H2 | Xhttp) && matches!(security, None | Tls)
        }
        Vless => match security {
            None | Tls => matches!(transport, Tcp | Ws | Grpc | H2 | Xhttp | HttpUpgrade),
            Xtls => transport == Tcp,
            Reality => matches!(transport, Tcp | Grpc),
        },
        Trojan => matches!(transport, Tcp | Ws | Grpc | Xhttp) && security == Tls,
        Shadowsocks => transport == Tcp && security == None,
        Hysteria2 => transport == Quic && security == Tls,
        Tuic => transport == Udp && security == Tls,
    }
}

/// One synthesized client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    pub transport: Transport,
    pub security: Security,

    /// UUID for vmess/vless/tuic.
    pub uuid: Option<String>,
    /// Password for trojan/shadowsocks/hysteria2/tuic.
    pub password: Option<String>,
    /// vmess alter-id; modern deployments use 0.
    pub alter_id: u32,
    /// vless flow control.
    pub flow: Option<String>,
    /// vless encryption field.
    pub encryption: Option<String>,
    /// Shadowsocks cipher.
    pub method: Option<String>,

    pub path: Option<String>,
    pub host: Option<String>,
    pub sni: Option<String>,
    pub alpn: Vec<String>,
    pub service_name: Option<String>,
    pub grpc_mode: Option<String>,

    /// TLS fingerprint label.
    pub fingerprint: Option<String>,
    pub allow_insecure: bool,
    /// Reality key material.
    pub public_key: Option<String>,
    pub short_id: Option<String>,
    pub spider_x: Option<String>,

    /// hysteria2 obfuscation.
    pub obfs: Option<String>,
    pub obfs_password: Option<String>,
    /// Shadowsocks plugin.
    pub plugin: Option<String>,
    pub plugin_opts: Option<String>,

    /// tuic QUIC tuning.
    pub congestion_control: Option<String>,
    pub udp_relay_mode: Option<String>,

    /// DPI-evasion hints attached for capable clients.
    pub padding_size: Option<usize>,
    pub fragmentation_points: Vec<usize>,

    pub remark: String,
    pub isp: String,
    pub country: String,
    pub health_score: u8,
    pub iran_optimized: bool,
}

impl ClientConfig {
    /// Create a config, rejecting unsupported triples.
    pub fn new(
        protocol: Protocol,
        address: impl Into<String>,
        port: u16,
        transport: Transport,
        security: Security,
    ) -> Result<Self> {
        if !combination_allowed(protocol, transport, security) {
            return Err(Error::unsupported_config(format!(
                "{protocol} over {transport} with {security}"
            )));
        }

        Ok(Self {
            protocol,
            address: address.into(),
            port,
            transport,
            security,
            uuid: None,
            password: None,
            alter_id: 0,
            flow: None,
            encryption: None,
            method: None,
            path: None,
            host: None,
            sni: None,
            alpn: Vec::new(),
            service_name: None,
            grpc_mode: None,
            fingerprint: None,
            allow_insecure: false,
            public_key: None,
            short_id: None,
            spider_x: None,
            obfs: None,
            obfs_password: None,
            plugin: None,
            plugin_opts: None,
            congestion_control: None,
            udp_relay_mode: None,
            padding_size: None,
            fragmentation_points: Vec::new(),
            remark: String::new(),
            isp: String::new(),
            country: String::new(),
            health_score: 0,
            iran_optimized: false,
        })
    }

    /// Score this config's suitability for heavily filtered networks and
    /// derive the Iran-optimized flag.
    pub fn finalize_score(&mut self) {
        let protocol_score = match self.protocol {
            Protocol::Vless => 30,
            Protocol::Hysteria2 => 28,
            Protocol::Tuic => 26,
            Protocol::Vmess => 25,
            Protocol::Trojan => 20,
            Protocol::Shadowsocks => 15,
        };

        let transport_score = match self.transport {
            Transport::Xhttp => 25,
            Transport::Grpc => 20,
            Transport::Ws => 18,
            Transport::HttpUpgrade => 15,
            Transport::H2 => 12,
            Transport::Quic => 10,
            Transport::Udp => 8,
            Transport::Tcp => 5,
        };

        let security_score = match self.security {
            Security::Reality => 25,
            Security::Xtls => 20,
            Security::Tls => 15,
            Security::None => 0,
        };

        let fingerprint_score = match self.fingerprint.as_deref() {
            Some(label) if label.starts_with("chrome") || label.starts_with("firefox") => 10,
            _ => 0,
        };

        let alpn_bonus = if self.alpn.is_empty() { 0 } else { 5 };
        let flow_bonus = if self.flow.is_some() { 5 } else { 0 };

        self.health_score = protocol_score
            + transport_score
            + security_score
            + fingerprint_score
            + alpn_bonus
            + flow_bonus;
        self.iran_optimized = self.health_score >= 70;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_accepts_known_good_triples() {
        assert!(combination_allowed(
            Protocol::Vless,
            Transport::Tcp,
            Security::Reality
        ));
        assert!(combination_allowed(
            Protocol::Vless,
            Transport::Grpc,
            Security::Reality
        ));
        assert!(combination_allowed(
            Protocol::Vmess,
            Transport::Xhttp,
            Security::Tls
        ));
        assert!(combination_allowed(
            Protocol::Hysteria2,
            Transport::Quic,
            Security::Tls
        ));
    }

    #[test]
    fn whitelist_rejects_bad_triples() {
        assert!(!combination_allowed(
            Protocol::Vless,
            Transport::Ws,
            Security::Reality
        ));
        assert!(!combination_allowed(
            Protocol::Vless,
            Transport::Grpc,
            Security::Xtls
        ));
        assert!(!combination_allowed(
            Protocol::Trojan,
            Transport::Tcp,
            Security::None
        ));
        assert!(!combination_allowed(
            Protocol::Shadowsocks,
            Transport::Ws,
            Security::None
        ));
        assert!(!combination_allowed(
            Protocol::Hysteria2,
            Transport::Tcp,
            Security::Tls
        ));
    }

    #[test]
    fn constructor_enforces_whitelist() {
        assert!(ClientConfig::new(
            Protocol::Vless,
            "1.2.3.4",
            443,
            Transport::Ws,
            Security::Reality
        )
        .is_err());
        assert!(ClientConfig::new(
            Protocol::Vless,
            "1.2.3.4",
            443,
            Transport::Tcp,
            Security::Reality
        )
        .is_ok());
    }

    #[test]
    fn scoring_rewards_evasive_stacks() {
        let mut reality =
            ClientConfig::new(Protocol::Vless, "1.2.3.4", 443, Transport::Tcp, Security::Reality)
                .unwrap();
        reality.fingerprint = Some("chrome120".to_string());
        reality.flow = Some("xtls-rprx-vision".to_string());
        reality.finalize_score();
        assert_eq!(reality.health_score, 30 + 5 + 25 + 10 + 5);
        assert!(reality.iran_optimized);

        let mut plain = ClientConfig::new(
            Protocol::Shadowsocks,
            "1.2.3.4",
            443,
            Transport::Tcp,
            Security::None,
        )
        .unwrap();
        plain.finalize_score();
        assert_eq!(plain.health_score, 15 + 5);
        assert!(!plain.iran_optimized);
    }

    #[test]
    fn non_browser_fingerprint_earns_no_bonus() {
        let mut config =
            ClientConfig::new(Protocol::Vmess, "1.2.3.4", 443, Transport::Ws, Security::Tls)
                .unwrap();
        config.fingerprint = Some("safari17".to_string());
        config.alpn = vec!["h2".to_string(), "http/1.1".to_string()];
        config.finalize_score();
        assert_eq!(config.health_score, 25 + 18 + 15 + 5);
    }
}

//! Subscription link rendering.
//!
//! One rendering function per protocol family; vmess additionally decodes,
//! which the round-trip tests lean on.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::subscription::{ClientConfig, Protocol, Security, Transport};

/// JSON payload of a `vmess://` link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VmessLink {
    pub v: String,
    pub ps: String,
    pub add: String,
    pub port: String,
    pub id: String,
    pub aid: u32,
    pub net: String,
    #[serde(rename = "type")]
    pub header_type: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub tls: String,
    #[serde(default)]
    pub sni: String,
    #[serde(default)]
    pub alpn: String,
    #[serde(default)]
    pub fp: String,
}

impl ClientConfig {
    /// Render this config as a subscription link.
    pub fn to_link(&self) -> Result<String> {
        match self.protocol {
            Protocol::Vmess => self.to_vmess_link(),
            Protocol::Vless => Ok(self.to_vless_link()),
            Protocol::Trojan => Ok(self.to_trojan_link()),
            Protocol::Shadowsocks => Ok(self.to_shadowsocks_link()),
            Protocol::Hysteria2 => Ok(self.to_hysteria2_link()),
            Protocol::Tuic => Ok(self.to_tuic_link()),
        }
    }

    fn to_vmess_link(&self) -> Result<String> {
        let link = VmessLink {
            v: "2".to_string(),
            ps: self.remark.clone(),
            add: self.address.clone(),
            port: self.port.to_string(),
            id: self.uuid.clone().unwrap_or_default(),
            aid: self.alter_id,
            net: self.transport.to_string(),
            header_type: "none".to_string(),
            host: self.host.clone().unwrap_or_default(),
            path: self.path.clone().unwrap_or_default(),
            tls: match self.security {
                Security::None => String::new(),
                other => other.to_string(),
            },
            sni: self.sni.clone().unwrap_or_default(),
            alpn: self.alpn.join(","),
            fp: self.fingerprint.clone().unwrap_or_default(),
        };
        let json = serde_json::to_string(&link)?;
        Ok(format!("vmess://{}", BASE64.encode(json)))
    }

    fn to_vless_link(&self) -> String {
        let mut params = vec![
            format!(
                "encryption={}",
                self.encryption.as_deref().unwrap_or("none")
            ),
            format!("security={}", self.security),
            format!("type={}", self.transport),
        ];

        if self.security != Security::None {
            if let Some(sni) = &self.sni {
                params.push(format!("sni={sni}"));
            }
            if let Some(fp) = &self.fingerprint {
                params.push(format!("fp={fp}"));
            }
            if !self.alpn.is_empty() {
                params.push(format!("alpn={}", self.alpn.join(",")));
            }
        }

        if self.security == Security::Reality {
            if let Some(pbk) = &self.public_key {
                params.push(format!("pbk={pbk}"));
            }
            if let Some(sid) = &self.short_id {
                params.push(format!("sid={sid}"));
            }
            if let Some(spx) = &self.spider_x {
                params.push(format!("spx={spx}"));
            }
        }

        if let Some(flow) = &self.flow {
            params.push(format!("flow={flow}"));
        }

        self.push_transport_params(&mut params);

        format!(
            "vless://{}@{}:{}?{}#{}",
            self.uuid.as_deref().unwrap_or_default(),
            self.address,
            self.port,
            params.join("&"),
            self.remark
        )
    }

    fn to_trojan_link(&self) -> String {
        let mut params = vec![
            format!("security={}", self.security),
            format!("type={}", self.transport),
        ];

        if self.security == Security::Tls {
            if let Some(sni) = &self.sni {
                params.push(format!("sni={sni}"));
            }
            if let Some(fp) = &self.fingerprint {
                params.push(format!("fp={fp}"));
            }
            if !self.alpn.is_empty() {
                params.push(format!("alpn={}", self.alpn.join(",")));
            }
        }

        self.push_transport_params(&mut params);

        format!(
            "trojan://{}@{}:{}?{}#{}",
            self.password.as_deref().unwrap_or_default(),
            self.address,
            self.port,
            params.join("&"),
            self.remark
        )
    }

    fn to_shadowsocks_link(&self) -> String {
        let user_info = format!(
            "{}:{}",
            self.method.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default()
        );
        let mut link = format!(
            "ss://{}@{}:{}",
            BASE64.encode(user_info),
            self.address,
            self.port
        );
        if let (Some(plugin), Some(opts)) = (&self.plugin, &self.plugin_opts) {
            link.push_str(&format!("/?plugin={plugin}%3B{opts}"));
        }
        link.push('#');
        link.push_str(&self.remark);
        link
    }

    fn to_hysteria2_link(&self) -> String {
        let mut params = Vec::new();
        if let Some(sni) = &self.sni {
            params.push(format!("sni={sni}"));
        }
        if let Some(obfs) = &self.obfs {
            params.push(format!("obfs={obfs}"));
        }
        if let Some(obfs_password) = &self.obfs_password {
            params.push(format!("obfs-password={obfs_password}"));
        }
        if !self.alpn.is_empty() {
            params.push(format!("alpn={}", self.alpn.join(",")));
        }

        format!(
            "hysteria2://{}@{}:{}/?{}#{}",
            self.password.as_deref().unwrap_or_default(),
            self.address,
            self.port,
            params.join("&"),
            self.remark
        )
    }

    fn to_tuic_link(&self) -> String {
        let mut params = Vec::new();
        if let Some(cc) = &self.congestion_control {
            params.push(format!("congestion_control={cc}"));
        }
        if let Some(mode) = &self.udp_relay_mode {
            params.push(format!("udp_relay_mode={mode}"));
        }
        if let Some(sni) = &self.sni {
            params.push(format!("sni={sni}"));
        }
        if !self.alpn.is_empty() {
            params.push(format!("alpn={}", self.alpn.join(",")));
        }

        format!(
            "tuic://{}:{}@{}:{}?{}#{}",
            self.uuid.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
            self.address,
            self.port,
            params.join("&"),
            self.remark
        )
    }

    fn push_transport_params(&self, params: &mut Vec<String>) {
        match self.transport {
            Transport::Ws | Transport::Xhttp | Transport::HttpUpgrade | Transport::H2 => {
                if let Some(host) = &self.host {
                    params.push(format!("host={host}"));
                }
                if let Some(path) = &self.path {
                    params.push(format!("path={path}"));
                }
            }
            Transport::Grpc => {
                if let Some(service) = &self.service_name {
                    params.push(format!("serviceName={service}"));
                }
                if let Some(mode) = &self.grpc_mode {
                    params.push(format!("mode={mode}"));
                }
            }
            _ => {}
        }
    }
}

/// Decode a `vmess://` link back into its JSON payload.
pub fn decode_vmess(link: &str) -> Result<VmessLink> {
    let encoded = link
        .strip_prefix("vmess://")
        .ok_or_else(|| Error::unsupported_config("not a vmess link"))?;
    let json = BASE64
        .decode(encoded)
        .map_err(|e| Error::unsupported_config(format!("bad vmess base64: {e}")))?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vmess_fixture() -> ClientConfig {
        let mut config =
            ClientConfig::new(Protocol::Vmess, "1.2.3.4", 443, Transport::Ws, Security::Tls)
                .unwrap();
        config.uuid = Some("2f4d8a6b-7e1c-4f3a-9b5d-8c6e2a1f0d9e".to_string());
        config.host = Some("www.cloudflare.com".to_string());
        config.path = Some("/ws".to_string());
        config.sni = Some("www.cloudflare.com".to_string());
        config.alpn = vec!["h2".to_string(), "http/1.1".to_string()];
        config.fingerprint = Some("chrome120".to_string());
        config.remark = "test".to_string();
        config
    }

    #[test]
    fn vmess_round_trips() {
        let config = vmess_fixture();
        let link = config.to_link().unwrap();
        assert!(link.starts_with("vmess://"));

        let decoded = decode_vmess(&link).unwrap();
        assert_eq!(decoded.add, "1.2.3.4");
        assert_eq!(decoded.port, "443");
        assert_eq!(decoded.id, config.uuid.unwrap());
        assert_eq!(decoded.net, "ws");
        assert_eq!(decoded.tls, "tls");
        assert_eq!(decoded.alpn, "h2,http/1.1");
        assert_eq!(decoded.fp, "chrome120");

        // Re-encoding the decoded payload is stable.
        let json = serde_json::to_string(&decoded).unwrap();
        let reparsed: VmessLink = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, reparsed);
    }

    #[test]
    fn vless_reality_link_carries_key_material() {
        let mut config = ClientConfig::new(
            Protocol::Vless,
            "5.6.7.8",
            443,
            Transport::Tcp,
            Security::Reality,
        )
        .unwrap();
        config.uuid = Some("uuid-here".to_string());
        config.encryption = Some("none".to_string());
        config.sni = Some("www.speedtest.net".to_string());
        config.fingerprint = Some("firefox121".to_string());
        config.public_key = Some("PUBKEY".to_string());
        config.short_id = Some("aabbccdd".to_string());
        config.spider_x = Some("/".to_string());
        config.flow = Some("xtls-rprx-vision".to_string());
        config.remark = "r".to_string();

        let link = config.to_link().unwrap();
        assert!(link.starts_with("vless://uuid-here@5.6.7.8:443?"));
        assert!(link.contains("security=reality"));
        assert!(link.contains("pbk=PUBKEY"));
        assert!(link.contains("sid=aabbccdd"));
        assert!(link.contains("flow=xtls-rprx-vision"));
    }

    #[test]
    fn shadowsocks_user_info_is_base64() {
        let mut config = ClientConfig::new(
            Protocol::Shadowsocks,
            "9.9.9.9",
            443,
            Transport::Tcp,
            Security::None,
        )
        .unwrap();
        config.method = Some("chacha20-ietf-poly1305".to_string());
        config.password = Some("secret".to_string());
        config.remark = "ss".to_string();

        let link = config.to_link().unwrap();
        let encoded = link
            .strip_prefix("ss://")
            .unwrap()
            .split('@')
            .next()
            .unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(decoded, b"chacha20-ietf-poly1305:secret");
    }

    #[test]
    fn trojan_link_shape() {
        let mut config = ClientConfig::new(
            Protocol::Trojan,
            "7.7.7.7",
            443,
            Transport::Grpc,
            Security::Tls,
        )
        .unwrap();
        config.password = Some("pw".to_string());
        config.sni = Some("discord.com".to_string());
        config.service_name = Some("TrojanGRPC".to_string());
        config.grpc_mode = Some("multi".to_string());
        config.remark = "t".to_string();

        let link = config.to_link().unwrap();
        assert!(link.starts_with("trojan://pw@7.7.7.7:443?"));
        assert!(link.contains("serviceName=TrojanGRPC"));
        assert!(link.contains("sni=discord.com"));
    }

    #[test]
    fn hysteria2_and_tuic_links() {
        let mut h2 = ClientConfig::new(
            Protocol::Hysteria2,
            "3.3.3.3",
            443,
            Transport::Quic,
            Security::Tls,
        )
        .unwrap();
        h2.password = Some("pw".to_string());
        h2.obfs = Some("salamander".to_string());
        h2.obfs_password = Some("opw".to_string());
        h2.alpn = vec!["h3".to_string()];
        h2.remark = "h".to_string();
        let link = h2.to_link().unwrap();
        assert!(link.starts_with("hysteria2://pw@3.3.3.3:443/?"));
        assert!(link.contains("obfs=salamander"));

        let mut tuic = ClientConfig::new(
            Protocol::Tuic,
            "4.4.4.4",
            443,
            Transport::Udp,
            Security::Tls,
        )
        .unwrap();
        tuic.uuid = Some("u".to_string());
        tuic.password = Some("p".to_string());
        tuic.congestion_control = Some("bbr".to_string());
        tuic.remark = "t".to_string();
        let link = tuic.to_link().unwrap();
        assert!(link.starts_with("tuic://u:p@4.4.4.4:443?"));
        assert!(link.contains("congestion_control=bbr"));
    }
}

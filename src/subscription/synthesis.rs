//! Config synthesis from passing endpoints.
//!
//! For each endpoint the synthesizer walks a fixed protocol × transport ×
//! security matrix, filtered by the DPI-evasion level, and emits one
//! [`ClientConfig`] per combination. Emission order is deterministic per
//! input; SNI, path, credentials, and fingerprint labels come from the
//! injected RNG, so equal seeds reproduce equal config sequences.

use std::sync::Arc;

use crate::cli::DpiEvasionLevel;
use crate::fingerprint::FingerprintProfile;
use crate::probe::engine::EndpointReport;
use crate::report::country_flag;
use crate::rng::RngService;
use crate::subscription::{ClientConfig, Protocol, Security, Transport};

/// SNI hostnames that blend into ordinary traffic from inside Iran.
pub const IRAN_SNI_HOSTS: &[&str] = &[
    "www.speedtest.net",
    "www.cloudflare.com",
    "discord.com",
    "www.google.com",
    "www.microsoft.com",
    "fast.com",
    "www.apple.com",
    "zula.ir",
    "www.visa.com",
    "laravel.com",
];

/// Extra SNI candidates outside Iran mode.
const EXTRA_SNI_HOSTS: &[&str] = &["www.yahoo.com", "www.github.com", "www.digitalocean.com"];

const COMMON_PATHS: &[&str] = &[
    "/",
    "/api",
    "/v2ray",
    "/vless",
    "/vmess",
    "/speedtest",
    "/graphql",
    "/ws",
    "/download",
    "/path",
    "/socket.io/",
    "/cdn-cgi/trace",
];

const IRAN_PATHS: &[&str] = &["/cloudflare", "/google", "/microsoft", "/apple", "/amazon"];

const GRPC_SERVICE_NAMES: &[&str] = &[
    "grpc",
    "GunService",
    "VMessGRPC",
    "VLESSGRPC",
    "TrojanGRPC",
    "CloudflareGRPC",
    "GoogleGRPC",
];

const VLESS_FLOWS: &[&str] = &["xtls-rprx-vision", "xtls-rprx-direct"];

/// Shadowsocks ciphers, best-first.
pub const SHADOWSOCKS_CIPHERS: &[&str] = &[
    "chacha20-ietf-poly1305",
    "aes-256-gcm",
    "aes-128-gcm",
    "2022-blake3-aes-256-gcm",
    "2022-blake3-aes-128-gcm",
];

/// Modern AEADs only, for filtered networks.
pub const SHADOWSOCKS_CIPHERS_IRAN: &[&str] = &[
    "chacha20-ietf-poly1305",
    "aes-256-gcm",
    "2022-blake3-aes-256-gcm",
];

/// Identity of the endpoint configs are synthesized for.
#[derive(Debug, Clone)]
pub struct EndpointIdentity {
    pub address: String,
    pub port: u16,
    pub isp: String,
    pub country: String,
}

impl From<&EndpointReport> for EndpointIdentity {
    fn from(report: &EndpointReport) -> Self {
        let meta = report.meta.as_ref();
        Self {
            address: report.endpoint.address.clone(),
            port: report.endpoint.port,
            isp: meta
                .and_then(|m| m.as_organization.clone())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| report.endpoint.provider_isp.clone()),
            country: meta
                .and_then(|m| m.country.clone())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| report.endpoint.provider_country.clone()),
        }
    }
}

/// Turns one passing endpoint into a scored config set.
pub struct ConfigSynthesizer {
    iran_mode: bool,
    level: DpiEvasionLevel,
    rng: Arc<RngService>,
}

impl ConfigSynthesizer {
    pub fn new(iran_mode: bool, level: DpiEvasionLevel, rng: Arc<RngService>) -> Self {
        Self {
            iran_mode,
            level,
            rng,
        }
    }

    /// Generate the full config set for one endpoint.
    pub fn synthesize(&self, endpoint: &EndpointIdentity) -> Vec<ClientConfig> {
        let mut configs = Vec::new();

        self.vmess_configs(endpoint, &mut configs);
        self.vless_configs(endpoint, &mut configs);
        self.trojan_configs(endpoint, &mut configs);
        self.shadowsocks_configs(endpoint, &mut configs);

        if self.level == DpiEvasionLevel::Maximum {
            self.hysteria2_config(endpoint, &mut configs);
            self.tuic_config(endpoint, &mut configs);
        }

        for config in &mut configs {
            config.finalize_score();
            config.remark = self.remark(config);
        }
        configs
    }

    fn vmess_configs(&self, endpoint: &EndpointIdentity, out: &mut Vec<ClientConfig>) {
        let uuid = self.rng.uuid_v4();
        for transport in self.stream_transports(&[Transport::Ws, Transport::Grpc, Transport::H2]) {
            if let Ok(mut config) = ClientConfig::new(
                Protocol::Vmess,
                &endpoint.address,
                endpoint.port,
                transport,
                Security::Tls,
            ) {
                config.uuid = Some(uuid.clone());
                self.apply_transport(&mut config, transport);
                self.apply_tls(&mut config);
                self.stamp(&mut config, endpoint);
                out.push(config);
            }

            if !self.iran_mode {
                if let Ok(mut config) = ClientConfig::new(
                    Protocol::Vmess,
                    &endpoint.address,
                    endpoint.port,
                    transport,
                    Security::None,
                ) {
                    config.uuid = Some(uuid.clone());
                    self.apply_transport(&mut config, transport);
                    self.stamp(&mut config, endpoint);
                    out.push(config);
                }
            }
        }
    }

    fn vless_configs(&self, endpoint: &EndpointIdentity, out: &mut Vec<ClientConfig>) {
        let uuid = self.rng.uuid_v4();

        let mut transports = Vec::new();
        if self.iran_mode {
            transports.extend([Transport::Xhttp, Transport::HttpUpgrade]);
        }
        transports.extend([Transport::Ws, Transport::Grpc, Transport::H2, Transport::Tcp]);

        let mut securities = vec![Security::Tls];
        if self.level >= DpiEvasionLevel::Aggressive {
            if self.iran_mode {
                securities.insert(0, Security::Reality);
            }
            securities.push(Security::Xtls);
        }

        for &transport in &transports {
            for &security in &securities {
                let Ok(mut config) = ClientConfig::new(
                    Protocol::Vless,
                    &endpoint.address,
                    endpoint.port,
                    transport,
                    security,
                ) else {
                    continue;
                };

                config.uuid = Some(uuid.clone());
                config.encryption = Some("none".to_string());
                self.apply_transport(&mut config, transport);

                match security {
                    Security::Tls => self.apply_tls(&mut config),
                    Security::Xtls => {
                        self.apply_tls(&mut config);
                        config.flow = Some(self.rng.pick(VLESS_FLOWS).to_string());
                    }
                    Security::Reality => {
                        config.sni = Some(self.random_sni());
                        config.fingerprint = Some(self.random_fingerprint());
                        config.public_key = Some(self.rng.public_key());
                        config.short_id = Some(self.rng.short_id());
                        config.spider_x = Some("/".to_string());
                        config.flow = Some(self.rng.pick(VLESS_FLOWS).to_string());
                    }
                    Security::None => {}
                }

                self.stamp(&mut config, endpoint);
                out.push(config);
            }

            // Plain-text variants only make sense where TLS is optional.
            if !self.iran_mode && matches!(transport, Transport::Ws | Transport::H2) {
                if let Ok(mut config) = ClientConfig::new(
                    Protocol::Vless,
                    &endpoint.address,
                    endpoint.port,
                    transport,
                    Security::None,
                ) {
                    config.uuid = Some(uuid.clone());
                    config.encryption = Some("none".to_string());
                    self.apply_transport(&mut config, transport);
                    self.stamp(&mut config, endpoint);
                    out.push(config);
                }
            }
        }
    }

    fn trojan_configs(&self, endpoint: &EndpointIdentity, out: &mut Vec<ClientConfig>) {
        let password = self.rng.password(32);
        for transport in self.stream_transports(&[Transport::Tcp, Transport::Ws, Transport::Grpc])
        {
            let Ok(mut config) = ClientConfig::new(
                Protocol::Trojan,
                &endpoint.address,
                endpoint.port,
                transport,
                Security::Tls,
            ) else {
                continue;
            };
            config.password = Some(password.clone());
            self.apply_transport(&mut config, transport);
            self.apply_tls(&mut config);
            self.stamp(&mut config, endpoint);
            out.push(config);
        }
    }

    fn shadowsocks_configs(&self, endpoint: &EndpointIdentity, out: &mut Vec<ClientConfig>) {
        let password = self.rng.password(16);
        let ciphers = if self.iran_mode {
            SHADOWSOCKS_CIPHERS_IRAN
        } else {
            SHADOWSOCKS_CIPHERS
        };

        for &cipher in ciphers {
            let Ok(mut config) = ClientConfig::new(
                Protocol::Shadowsocks,
                &endpoint.address,
                endpoint.port,
                Transport::Tcp,
                Security::None,
            ) else {
                continue;
            };
            config.password = Some(password.clone());
            config.method = Some(cipher.to_string());
            if self.iran_mode {
                config.plugin = Some("obfs-local".to_string());
                config.plugin_opts = Some(format!("obfs=tls;obfs-host={}", self.random_sni()));
            }
            self.stamp(&mut config, endpoint);
            out.push(config);
        }
    }

    fn hysteria2_config(&self, endpoint: &EndpointIdentity, out: &mut Vec<ClientConfig>) {
        let Ok(mut config) = ClientConfig::new(
            Protocol::Hysteria2,
            &endpoint.address,
            endpoint.port,
            Transport::Quic,
            Security::Tls,
        ) else {
            return;
        };
        config.password = Some(self.rng.password(32));
        config.obfs = Some("salamander".to_string());
        config.obfs_password = Some(self.rng.password(16));
        config.sni = Some(self.random_sni());
        config.fingerprint = Some(self.random_fingerprint());
        config.alpn = vec!["h3".to_string()];
        self.stamp(&mut config, endpoint);
        out.push(config);
    }

    fn tuic_config(&self, endpoint: &EndpointIdentity, out: &mut Vec<ClientConfig>) {
        let Ok(mut config) = ClientConfig::new(
            Protocol::Tuic,
            &endpoint.address,
            endpoint.port,
            Transport::Udp,
            Security::Tls,
        ) else {
            return;
        };
        config.uuid = Some(self.rng.uuid_v4());
        config.password = Some(self.rng.password(32));
        config.congestion_control = Some("bbr".to_string());
        config.udp_relay_mode = Some("native".to_string());
        config.sni = Some(self.random_sni());
        config.fingerprint = Some(self.random_fingerprint());
        config.alpn = vec!["h3".to_string(), "spdy/3.1".to_string()];
        self.stamp(&mut config, endpoint);
        out.push(config);
    }

    /// Transport list with the Iran-favoured entries prepended so they are
    /// generated first.
    fn stream_transports(&self, base: &[Transport]) -> Vec<Transport> {
        let mut transports = Vec::with_capacity(base.len() + 1);
        if self.iran_mode {
            transports.push(Transport::Xhttp);
        }
        transports.extend_from_slice(base);
        transports
    }

    fn apply_transport(&self, config: &mut ClientConfig, transport: Transport) {
        match transport {
            t if t.uses_host_path() => {
                config.path = Some(self.random_path());
                config.host = Some(self.random_sni());
            }
            Transport::Grpc => {
                config.service_name = Some(self.rng.pick(GRPC_SERVICE_NAMES).to_string());
                config.grpc_mode = Some("multi".to_string());
            }
            _ => {}
        }
    }

    fn apply_tls(&self, config: &mut ClientConfig) {
        config.sni = Some(self.random_sni());
        config.fingerprint = Some(self.random_fingerprint());
        config.alpn = vec!["h2".to_string(), "http/1.1".to_string()];
    }

    fn stamp(&self, config: &mut ClientConfig, endpoint: &EndpointIdentity) {
        config.isp = endpoint.isp.clone();
        config.country = endpoint.country.clone();
    }

    fn random_sni(&self) -> String {
        if self.iran_mode {
            return self.rng.pick(IRAN_SNI_HOSTS).to_string();
        }
        let mut hosts: Vec<&str> = IRAN_SNI_HOSTS.to_vec();
        hosts.extend_from_slice(EXTRA_SNI_HOSTS);
        self.rng.pick(&hosts).to_string()
    }

    fn random_path(&self) -> String {
        if self.iran_mode {
            let mut paths: Vec<&str> = COMMON_PATHS.to_vec();
            paths.extend_from_slice(IRAN_PATHS);
            return self.rng.pick(&paths).to_string();
        }
        self.rng.pick(COMMON_PATHS).to_string()
    }

    /// Rotated fingerprint label. Iran mode sticks to the Chrome/Firefox
    /// surfaces that pass the strictest filtering.
    fn random_fingerprint(&self) -> String {
        if self.iran_mode {
            let labels = [
                FingerprintProfile::Chrome120.label(),
                FingerprintProfile::Firefox121.label(),
            ];
            return self.rng.pick(&labels).to_string();
        }
        self.rng.pick(&FingerprintProfile::labels()).to_string()
    }

    fn remark(&self, config: &ClientConfig) -> String {
        let mut parts = Vec::new();

        let flag = country_flag(&config.country);
        if !flag.is_empty() {
            parts.push(flag);
        }

        let mut isp = config.isp.clone();
        if isp.len() > 20 {
            isp.truncate(20);
        }
        if !isp.is_empty() {
            parts.push(isp);
        }

        parts.push(config.protocol.as_str().to_uppercase());
        parts.push(config.transport.short_name().to_string());
        if config.security != Security::None {
            parts.push(config.security.as_str().to_uppercase());
        }
        if config.iran_optimized {
            parts.push("🇮🇷".to_string());
        }

        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointIdentity {
        EndpointIdentity {
            address: "203.0.113.20".to_string(),
            port: 443,
            isp: "Cloudflare, Inc.".to_string(),
            country: "US".to_string(),
        }
    }

    fn synth(iran: bool, level: DpiEvasionLevel, seed: u64) -> ConfigSynthesizer {
        ConfigSynthesizer::new(iran, level, RngService::with_seed(seed))
    }

    #[test]
    fn every_emitted_triple_is_whitelisted() {
        for (iran, level) in [
            (true, DpiEvasionLevel::Standard),
            (true, DpiEvasionLevel::Aggressive),
            (true, DpiEvasionLevel::Maximum),
            (false, DpiEvasionLevel::Maximum),
        ] {
            let configs = synth(iran, level, 9).synthesize(&endpoint());
            assert!(!configs.is_empty());
            for config in &configs {
                assert!(
                    crate::subscription::combination_allowed(
                        config.protocol,
                        config.transport,
                        config.security
                    ),
                    "{} / {} / {}",
                    config.protocol,
                    config.transport,
                    config.security
                );
            }
        }
    }

    #[test]
    fn equal_seeds_reproduce_equal_sequences() {
        let a = synth(true, DpiEvasionLevel::Maximum, 42).synthesize(&endpoint());
        let b = synth(true, DpiEvasionLevel::Maximum, 42).synthesize(&endpoint());
        assert_eq!(a.len(), b.len());
        for (left, right) in a.iter().zip(&b) {
            assert_eq!(left.to_link().unwrap(), right.to_link().unwrap());
        }

        let c = synth(true, DpiEvasionLevel::Maximum, 43).synthesize(&endpoint());
        let same: usize = a
            .iter()
            .zip(&c)
            .filter(|(l, r)| l.to_link().unwrap() == r.to_link().unwrap())
            .count();
        assert!(same < a.len());
    }

    #[test]
    fn maximum_iran_emits_reality_and_xhttp_as_optimized() {
        let configs = synth(true, DpiEvasionLevel::Maximum, 7).synthesize(&endpoint());

        let reality = configs
            .iter()
            .find(|c| c.security == Security::Reality)
            .expect("reality config present");
        assert!(reality.iran_optimized);

        let xhttp = configs
            .iter()
            .find(|c| c.transport == Transport::Xhttp)
            .expect("xhttp config present");
        assert!(xhttp.iran_optimized);
    }

    #[test]
    fn iran_mode_generates_xhttp_first() {
        let configs = synth(true, DpiEvasionLevel::Aggressive, 5).synthesize(&endpoint());
        let first_vmess = configs
            .iter()
            .find(|c| c.protocol == Protocol::Vmess)
            .unwrap();
        assert_eq!(first_vmess.transport, Transport::Xhttp);

        let first_vless = configs
            .iter()
            .find(|c| c.protocol == Protocol::Vless)
            .unwrap();
        assert_eq!(first_vless.transport, Transport::Xhttp);
    }

    #[test]
    fn iran_mode_restricts_shadowsocks_ciphers() {
        let configs = synth(true, DpiEvasionLevel::Standard, 3).synthesize(&endpoint());
        let ss: Vec<_> = configs
            .iter()
            .filter(|c| c.protocol == Protocol::Shadowsocks)
            .collect();
        assert_eq!(ss.len(), SHADOWSOCKS_CIPHERS_IRAN.len());
        for config in &ss {
            assert!(SHADOWSOCKS_CIPHERS_IRAN.contains(&config.method.as_deref().unwrap()));
            assert_eq!(config.plugin.as_deref(), Some("obfs-local"));
        }
    }

    #[test]
    fn standard_level_has_no_reality_or_quic_families() {
        let configs = synth(true, DpiEvasionLevel::Standard, 3).synthesize(&endpoint());
        assert!(configs.iter().all(|c| c.security != Security::Reality));
        assert!(configs.iter().all(|c| c.security != Security::Xtls));
        assert!(configs.iter().all(|c| c.protocol != Protocol::Hysteria2));
        assert!(configs.iter().all(|c| c.protocol != Protocol::Tuic));
    }

    #[test]
    fn every_tls_config_has_iran_friendly_sni() {
        let configs = synth(true, DpiEvasionLevel::Maximum, 13).synthesize(&endpoint());
        for config in configs.iter().filter(|c| c.sni.is_some()) {
            assert!(IRAN_SNI_HOSTS.contains(&config.sni.as_deref().unwrap()));
        }
    }

    #[test]
    fn remarks_carry_protocol_and_flag() {
        let configs = synth(true, DpiEvasionLevel::Aggressive, 21).synthesize(&endpoint());
        let config = &configs[0];
        assert!(config.remark.contains(&config.protocol.as_str().to_uppercase()));
        assert!(config.remark.contains("🇺🇸"));
    }
}

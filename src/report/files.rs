//! Subscription file layout.
//!
//! One plain file with every passing link, a Base64 twin, per-protocol and
//! per-region splits, the Iran transport subsets, and a statistics.json
//! summarizing the run.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::subscription::tester::TestedConfig;
use crate::subscription::{Security, Transport};

/// Write every output file under `base_output`'s directory.
pub fn write_config_files(base_output: impl AsRef<Path>, tested: &[TestedConfig]) -> Result<()> {
    let base_output = base_output.as_ref();
    let base_dir = base_output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let protocol_dir = base_dir.join("by-protocol");
    let region_dir = base_dir.join("by-region");
    let base64_dir = base_dir.join("base64");
    for dir in [&base_dir, &protocol_dir, &region_dir, &base64_dir] {
        std::fs::create_dir_all(dir)?;
    }

    // Score-descending order everywhere.
    let mut ordered: Vec<&TestedConfig> = tested.iter().collect();
    ordered.sort_by(|a, b| {
        b.config
            .health_score
            .cmp(&a.config.health_score)
            .then(a.avg_latency_ms.cmp(&b.avg_latency_ms))
    });

    let mut all_links = Vec::with_capacity(ordered.len());
    let mut by_protocol: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    let mut by_region: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut iran_xhttp = Vec::new();
    let mut iran_websocket = Vec::new();
    let mut iran_grpc = Vec::new();
    let mut iran_reality = Vec::new();

    for item in &ordered {
        let link = match item.config.to_link() {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unrenderable config");
                continue;
            }
        };

        all_links.push(link.clone());
        by_protocol
            .entry(item.config.protocol.as_str())
            .or_default()
            .push(link.clone());

        let region = if item.config.country.is_empty() {
            "unknown".to_string()
        } else {
            item.config.country.to_lowercase()
        };
        by_region.entry(region).or_default().push(link.clone());

        if item.config.iran_optimized {
            match item.config.transport {
                Transport::Xhttp => iran_xhttp.push(link.clone()),
                Transport::Ws | Transport::HttpUpgrade => iran_websocket.push(link.clone()),
                Transport::Grpc => iran_grpc.push(link.clone()),
                _ => {}
            }
            if item.config.security == Security::Reality {
                iran_reality.push(link.clone());
            }
        }
    }

    // Plain subscription file, then its Base64 twin.
    let plain = all_links.join("\n");
    std::fs::write(base_output, format!("{plain}\n"))?;
    std::fs::write(
        base64_dir.join("all-configs-base64.txt"),
        BASE64.encode(&plain),
    )?;

    for (protocol, links) in &by_protocol {
        std::fs::write(
            protocol_dir.join(format!("{protocol}.txt")),
            format!("{}\n", links.join("\n")),
        )?;
    }

    for (region, links) in &by_region {
        std::fs::write(
            region_dir.join(format!("{region}.txt")),
            format!("{}\n", links.join("\n")),
        )?;
    }

    for (name, links) in [
        ("iran-xhttp", &iran_xhttp),
        ("iran-websocket", &iran_websocket),
        ("iran-grpc", &iran_grpc),
        ("iran-reality", &iran_reality),
    ] {
        if links.is_empty() {
            continue;
        }
        std::fs::write(
            base_dir.join(format!("{name}.txt")),
            format!("{}\n", links.join("\n")),
        )?;
    }

    write_statistics(&base_dir, tested)?;

    tracing::info!(
        total = all_links.len(),
        dir = %base_dir.display(),
        "config files written"
    );
    Ok(())
}

fn write_statistics(base_dir: &Path, tested: &[TestedConfig]) -> Result<()> {
    let mut protocol_breakdown: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut iran_optimized = 0usize;
    let mut port_443 = 0usize;
    let mut score_sum = 0u64;

    for item in tested {
        *protocol_breakdown
            .entry(item.config.protocol.as_str())
            .or_default() += 1;
        if item.config.iran_optimized {
            iran_optimized += 1;
        }
        if item.config.port == 443 {
            port_443 += 1;
        }
        score_sum += item.config.health_score as u64;
    }

    let average_health_score = if tested.is_empty() {
        0
    } else {
        score_sum / tested.len() as u64
    };

    let stats = serde_json::json!({
        "total_configs": tested.len(),
        "protocol_breakdown": protocol_breakdown,
        "iran_optimized_count": iran_optimized,
        "port_443_count": port_443,
        "average_health_score": average_health_score,
    });

    std::fs::write(
        base_dir.join("statistics.json"),
        serde_json::to_string_pretty(&stats)?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{ClientConfig, Protocol};

    fn tested(protocol: Protocol, transport: Transport, security: Security, score: u8) -> TestedConfig {
        let mut config =
            ClientConfig::new(protocol, "203.0.113.30", 443, transport, security).unwrap();
        config.uuid = Some("11111111-2222-4333-8444-555555555555".to_string());
        config.password = Some("pw".to_string());
        config.method = Some("aes-256-gcm".to_string());
        config.country = "DE".to_string();
        config.remark = "r".to_string();
        config.health_score = score;
        config.iran_optimized = score >= 70;
        TestedConfig {
            config,
            passed: true,
            first_latency_ms: 40,
            avg_latency_ms: 42,
            success_rate: 1.0,
            error: None,
            target_results: Vec::new(),
        }
    }

    #[test]
    fn layout_and_base64_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("iran-configs.txt");

        let configs = vec![
            tested(Protocol::Vmess, Transport::Xhttp, Security::Tls, 80),
            tested(Protocol::Vless, Transport::Grpc, Security::Reality, 90),
            tested(Protocol::Shadowsocks, Transport::Tcp, Security::None, 20),
        ];
        write_config_files(&base, &configs).unwrap();

        let plain = std::fs::read_to_string(&base).unwrap();
        let lines: Vec<&str> = plain.trim_end().lines().collect();
        assert_eq!(lines.len(), 3);
        // Highest score first.
        assert!(lines[0].starts_with("vless://"));

        let encoded =
            std::fs::read_to_string(dir.path().join("base64/all-configs-base64.txt")).unwrap();
        let decoded = BASE64.decode(encoded.trim_end()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), plain.trim_end());

        assert!(dir.path().join("by-protocol/vmess.txt").exists());
        assert!(dir.path().join("by-protocol/shadowsocks.txt").exists());
        assert!(dir.path().join("by-region/de.txt").exists());
        assert!(dir.path().join("iran-xhttp.txt").exists());
        assert!(dir.path().join("iran-reality.txt").exists());
        // The reality config rides grpc, so the grpc subset is populated too.
        assert!(dir.path().join("iran-grpc.txt").exists());

        let stats: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("statistics.json")).unwrap())
                .unwrap();
        assert_eq!(stats["total_configs"], 3);
        assert_eq!(stats["iran_optimized_count"], 2);
        assert_eq!(stats["protocol_breakdown"]["vmess"], 1);
    }
}

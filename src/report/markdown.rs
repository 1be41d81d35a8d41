//! Markdown report rendering.

use chrono::{FixedOffset, Utc};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::checker::StatsSnapshot;
use crate::probe::engine::EndpointReport;
use crate::report::{country_flag, country_name, health_icon, latency_emoji};

/// Providers that get their own report section, in order.
const TOP_PROVIDERS: &[&str] = &[
    "Cloudflare",
    "Google",
    "Amazon",
    "Akamai",
    "Hetzner",
    "DigitalOcean",
];

/// Render and write the full report.
///
/// Section order is fixed: Iran-optimized endpoints first (when any),
/// then the named providers, then countries alphabetically. Rows are
/// sorted by descending health score, ties broken by latency.
pub fn write_report(
    path: impl AsRef<Path>,
    by_country: &HashMap<String, Vec<EndpointReport>>,
    stats: &StatsSnapshot,
) -> crate::error::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_report(by_country, stats))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}

fn render_report(
    by_country: &HashMap<String, Vec<EndpointReport>>,
    stats: &StatsSnapshot,
) -> String {
    let mut out = String::new();

    let tehran = FixedOffset::east_opt(3 * 3600 + 1800).expect("fixed offset");
    let now = Utc::now().with_timezone(&tehran);
    let avg_latency = average_latency(by_country);

    let _ = writeln!(out, "# 🇮🇷 Iran-Optimized Proxy Report\n");
    let _ = writeln!(
        out,
        "> Last update: {} (Tehran)  ",
        now.format("%a, %d %b %Y %H:%M")
    );
    let _ = writeln!(
        out,
        "> Active: **{}** · Iran-optimized: **{}** · Countries: **{}** · Avg latency: **{} ms**\n",
        stats.total_active,
        stats.iran_optimized,
        by_country.len(),
        avg_latency
    );

    write_iran_section(&mut out, by_country);
    write_provider_sections(&mut out, by_country);
    write_country_sections(&mut out, by_country);

    out
}

fn average_latency(by_country: &HashMap<String, Vec<EndpointReport>>) -> u64 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for report in by_country.values().flatten() {
        sum += report.mean_latency_ms;
        count += 1;
    }
    if count == 0 {
        0
    } else {
        sum / count
    }
}

fn sorted(mut reports: Vec<EndpointReport>) -> Vec<EndpointReport> {
    reports.sort_by(|a, b| {
        b.health_score
            .cmp(&a.health_score)
            .then(a.mean_latency_ms.cmp(&b.mean_latency_ms))
    });
    reports
}

fn location_of(report: &EndpointReport) -> String {
    let region = report
        .meta
        .as_ref()
        .and_then(|m| m.region.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let city = report
        .meta
        .as_ref()
        .and_then(|m| m.city.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    format!("{region}, {city}")
}

fn write_row(out: &mut String, report: &EndpointReport) {
    let _ = writeln!(
        out,
        "| <pre><code>{}:{}</code></pre> | {} | {} | {} ms {} | {} {}% |",
        report.endpoint.address,
        report.endpoint.port,
        report.endpoint.provider_isp,
        location_of(report),
        report.mean_latency_ms,
        latency_emoji(report.mean_latency_ms),
        health_icon(report.health_score),
        report.health_score,
    );
}

const TABLE_HEADER: &str = "|   IP   |   ISP   |   Location   |   Latency   |   Health Score   |\n|:-------|:--------|:------------:|:-----------:|:----------------:|";

fn write_iran_section(out: &mut String, by_country: &HashMap<String, Vec<EndpointReport>>) {
    let iran: Vec<EndpointReport> = by_country
        .values()
        .flatten()
        .filter(|r| r.iran_optimized)
        .cloned()
        .collect();
    if iran.is_empty() {
        return;
    }

    let iran = sorted(iran);
    let _ = writeln!(out, "## 🇮🇷 Iran-Optimized Proxies ({})\n", iran.len());
    let _ = writeln!(
        out,
        "> High health score, DPI evasion verified across multiple targets\n"
    );
    let _ = writeln!(out, "{TABLE_HEADER}");
    for report in &iran {
        write_row(out, report);
    }
    let _ = writeln!(out, "\n---\n");
}

fn write_provider_sections(out: &mut String, by_country: &HashMap<String, Vec<EndpointReport>>) {
    for provider in TOP_PROVIDERS {
        let matching: Vec<EndpointReport> = by_country
            .values()
            .flatten()
            .filter(|r| {
                r.endpoint
                    .provider_isp
                    .to_lowercase()
                    .contains(&provider.to_lowercase())
            })
            .cloned()
            .collect();
        if matching.is_empty() {
            continue;
        }

        let matching = sorted(matching);
        let _ = writeln!(out, "## {provider} ({})\n", matching.len());
        let _ = writeln!(out, "{TABLE_HEADER}");
        for report in &matching {
            write_row(out, report);
        }
        let _ = writeln!(out, "\n---\n");
    }
}

fn write_country_sections(out: &mut String, by_country: &HashMap<String, Vec<EndpointReport>>) {
    let mut countries: Vec<&String> = by_country.keys().collect();
    countries.sort();

    for country in countries {
        let reports = sorted(by_country[country].clone());
        let _ = writeln!(
            out,
            "## {} {} ({} proxies)\n",
            country_flag(country),
            country_name(country),
            reports.len()
        );
        let _ = writeln!(out, "{TABLE_HEADER}");
        for report in &reports {
            write_row(out, report);
        }
        let _ = writeln!(out, "\n---\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::engine::Endpoint;
    use std::time::Duration;

    fn report(address: &str, isp: &str, health: u8, latency: u64) -> EndpointReport {
        EndpointReport {
            endpoint: Endpoint {
                address: address.to_string(),
                port: 443,
                provider_country: "US".to_string(),
                provider_isp: isp.to_string(),
            },
            outcomes: Vec::new(),
            success_rate: 1.0,
            first_latency_ms: latency,
            mean_latency_ms: latency,
            health_score: health,
            jitter_ms: 1.0,
            stability: 90.0,
            dpi_suspected: false,
            dpi_evaded: true,
            multi_endpoint: true,
            fingerprint_label: Some("chrome120"),
            meta: None,
            loopback: false,
            iran_optimized: health >= 70,
        }
    }

    fn stats() -> StatsSnapshot {
        StatsSnapshot {
            total_tested: 3,
            total_active: 2,
            total_failed: 1,
            iran_optimized: 2,
            dpi_evaded: 2,
            multi_endpoint_ok: 2,
            elapsed: Duration::from_secs(10),
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let mut by_country = HashMap::new();
        by_country.insert(
            "US".to_string(),
            vec![report("1.1.1.1", "Cloudflare, Inc.", 95, 40)],
        );
        by_country.insert(
            "DE".to_string(),
            vec![report("5.5.5.5", "Hetzner Online", 80, 120)],
        );

        let rendered = render_report(&by_country, &stats());

        let iran = rendered.find("Iran-Optimized Proxies").unwrap();
        let cloudflare = rendered.find("## Cloudflare").unwrap();
        let hetzner = rendered.find("## Hetzner").unwrap();
        let germany = rendered.find("## 🇩🇪 Germany").unwrap();
        let us = rendered.find("## 🇺🇸 United States").unwrap();

        assert!(iran < cloudflare);
        assert!(cloudflare < hetzner);
        assert!(hetzner < germany);
        assert!(germany < us);
    }

    #[test]
    fn rows_sort_by_health_then_latency() {
        let mut by_country = HashMap::new();
        by_country.insert(
            "US".to_string(),
            vec![
                report("1.0.0.1", "Cloudflare", 80, 50),
                report("1.0.0.2", "Cloudflare", 95, 90),
                report("1.0.0.3", "Cloudflare", 95, 40),
            ],
        );

        let rendered = render_report(&by_country, &stats());
        let fastest = rendered.find("1.0.0.3").unwrap();
        let slower = rendered.find("1.0.0.2").unwrap();
        let weakest = rendered.find("1.0.0.1").unwrap();
        assert!(fastest < slower);
        assert!(slower < weakest);
    }

    #[test]
    fn iran_section_omitted_when_empty() {
        let mut by_country = HashMap::new();
        by_country.insert("US".to_string(), vec![report("1.0.0.1", "Cloudflare", 50, 50)]);
        let rendered = render_report(&by_country, &stats());
        assert!(!rendered.contains("Iran-Optimized Proxies"));
    }
}

//! Output rendering: the Markdown report and the subscription files.

pub mod files;
pub mod markdown;

/// Regional-indicator flag for an ISO-2 country code.
pub fn country_flag(code: &str) -> String {
    code.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase())
        .map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)).unwrap_or(c))
        .collect()
}

/// Human-readable country name, falling back to the code itself.
pub fn country_name(code: &str) -> &str {
    let known = match code.to_uppercase().as_str() {
        "US" => "United States",
        "DE" => "Germany",
        "GB" => "United Kingdom",
        "FR" => "France",
        "NL" => "Netherlands",
        "CA" => "Canada",
        "AU" => "Australia",
        "JP" => "Japan",
        "CN" => "China",
        "SG" => "Singapore",
        "KR" => "South Korea",
        "IN" => "India",
        "RU" => "Russia",
        "BR" => "Brazil",
        "IT" => "Italy",
        "ES" => "Spain",
        "SE" => "Sweden",
        "CH" => "Switzerland",
        "TR" => "Turkey",
        "PL" => "Poland",
        "FI" => "Finland",
        "NO" => "Norway",
        "IE" => "Ireland",
        "BE" => "Belgium",
        "AT" => "Austria",
        "DK" => "Denmark",
        "CZ" => "Czech Republic",
        "UA" => "Ukraine",
        "HK" => "Hong Kong",
        "TW" => "Taiwan",
        "IR" => "Iran",
        "ZA" => "South Africa",
        "RO" => "Romania",
        "ID" => "Indonesia",
        "VN" => "Vietnam",
        "TH" => "Thailand",
        "MY" => "Malaysia",
        "MX" => "Mexico",
        "AR" => "Argentina",
        "IL" => "Israel",
        "AE" => "United Arab Emirates",
        "SA" => "Saudi Arabia",
        "PT" => "Portugal",
        "HU" => "Hungary",
        "GR" => "Greece",
        "BG" => "Bulgaria",
        _ => "",
    };
    if known.is_empty() {
        code
    } else {
        known
    }
}

/// Traffic-light icon for a health score.
pub fn health_icon(score: u8) -> &'static str {
    if score >= 90 {
        "🟢"
    } else if score >= 70 {
        "🟡"
    } else {
        "🔴"
    }
}

/// Speed icon for a latency in milliseconds.
pub fn latency_emoji(latency_ms: u64) -> &'static str {
    if latency_ms < 100 {
        "⚡⚡"
    } else if latency_ms < 300 {
        "⚡"
    } else if latency_ms < 1000 {
        "🐇"
    } else {
        "🐌"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_two_regional_indicators() {
        assert_eq!(country_flag("US").chars().count(), 2);
        assert_eq!(country_flag("ir").chars().count(), 2);
        assert_eq!(country_flag(""), "");
    }

    #[test]
    fn country_names_fall_back_to_code() {
        assert_eq!(country_name("DE"), "Germany");
        assert_eq!(country_name("XX"), "XX");
    }

    #[test]
    fn icon_thresholds() {
        assert_eq!(health_icon(95), "🟢");
        assert_eq!(health_icon(70), "🟡");
        assert_eq!(health_icon(69), "🔴");
        assert_eq!(latency_emoji(50), "⚡⚡");
        assert_eq!(latency_emoji(250), "⚡");
        assert_eq!(latency_emoji(500), "🐇");
        assert_eq!(latency_emoji(1500), "🐌");
    }
}

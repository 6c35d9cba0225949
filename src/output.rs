//! Rendering of the validated proxy for stdout

use crate::proxy::ValidatedProxy;

const RULE_WIDTH: usize = 60;

/// `export http_proxy=...` / `export https_proxy=...`
pub fn export_lines(proxy: &ValidatedProxy) -> Vec<String> {
    ["http_proxy", "https_proxy"]
        .iter()
        .map(|var| format!("export {}='{}'", var, proxy.url))
        .collect()
}

/// Human-readable summary followed by the export lines
pub fn render_text(proxy: &ValidatedProxy) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let candidate = &proxy.candidate;
    let mut lines = vec![
        rule.clone(),
        format!("Working {} proxy", proxy.scheme.as_str().to_uppercase()),
        rule.clone(),
        format!("Location: {}", candidate.location),
        format!("Host: {}", candidate.host),
        format!("Port: {}", candidate.port),
    ];
    if let Some(user) = &candidate.username {
        lines.push(format!("Username: {}", user));
        lines.push(format!("Password: {}", candidate.password.as_deref().unwrap_or("")));
    }
    if let Some(ip) = &proxy.exit_ip {
        lines.push(format!("Exit IP: {}", ip));
    }
    lines.push(rule);
    lines.push(format!("Proxy URL: {}", proxy.url));
    lines.push(String::new());
    lines.extend(export_lines(proxy));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn render_json(proxy: &ValidatedProxy) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(proxy)
}

#![forbid(unsafe_code)]

use std::fmt::Write as _;

use crate::api::types::{Analysis, NmapHost};
use crate::output::Table;

/// Plain-text report of an Nmap analysis, one block per host.
#[must_use]
pub fn render(analysis: &Analysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", source_line(analysis));

    if analysis.hosts.is_empty() {
        out.push_str("No host information found in the Nmap scan results.\n");
        return out;
    }
    for host in &analysis.hosts {
        out.push('\n');
        render_host(&mut out, host);
    }
    out
}

pub(crate) fn source_line(analysis: &Analysis) -> String {
    let source = analysis.source.as_deref().unwrap_or("unknown");
    match &analysis.warning {
        Some(w) => format!("Notice: {w} (parsed from: {source})"),
        None if source == "xml" => "Parsed from: XML output".to_owned(),
        None => format!("Parsed from: {source} output"),
    }
}

fn render_host(out: &mut String, host: &NmapHost) {
    let status = if host.status.is_empty() { "unknown" } else { &host.status };
    let _ = writeln!(out, "Host: {} [{status}]", host.label());

    for os in &host.osmatch {
        let accuracy = os.accuracy.as_deref().unwrap_or("?");
        let _ = write!(out, "  OS: {} ({accuracy}%)", os.name);
        if !os.cpe.is_empty() {
            let _ = write!(out, "  CPEs: {}", os.cpe.join(", "));
        }
        out.push('\n');
    }
    if host.osmatch.is_empty() && !host.host_cpes.is_empty() {
        let _ = writeln!(out, "  Host CPEs: {}", host.host_cpes.join(", "));
    }

    if host.ports.is_empty() {
        out.push_str("  No open ports found for this host.\n");
        return;
    }
    let mut t = Table::new(["PORT", "SERVICE", "PRODUCT/VERSION", "CPE"]).max_width(48);
    for p in &host.ports {
        let pv = p.product_version();
        t.row([
            format!("{}/{}", p.port, p.protocol),
            or_na(p.service.as_deref()),
            or_na(Some(pv.as_str())),
            or_na(p.cpe.as_deref()),
        ]);
    }
    for line in t.render().lines() {
        let _ = writeln!(out, "  {line}");
    }
}

fn or_na(s: Option<&str>) -> String {
    match s.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_owned(),
        _ => "N/A".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{NmapPort, OsMatch};

    fn host() -> NmapHost {
        NmapHost {
            host: "scanme".to_owned(),
            ip: "10.0.0.5".to_owned(),
            status: "up".to_owned(),
            ports: vec![NmapPort {
                port: "22".to_owned(),
                protocol: "tcp".to_owned(),
                service: Some("ssh".to_owned()),
                product: Some("OpenSSH".to_owned()),
                version: Some("8.9".to_owned()),
                ..NmapPort::default()
            }],
            osmatch: vec![OsMatch {
                name: "Linux 5.x".to_owned(),
                accuracy: Some("96".to_owned()),
                cpe: vec!["cpe:/o:linux:linux_kernel:5".to_owned()],
            }],
            host_cpes: Vec::new(),
        }
    }

    #[test]
    fn renders_hosts_os_and_ports() {
        let a = Analysis {
            source: Some("xml".to_owned()),
            warning: None,
            hosts: vec![host()],
        };
        let text = render(&a);
        assert!(text.starts_with("Parsed from: XML output\n"));
        assert!(text.contains("Host: scanme (10.0.0.5) [up]"));
        assert!(text.contains("OS: Linux 5.x (96%)  CPEs: cpe:/o:linux:linux_kernel:5"));
        assert!(text.contains("22/tcp"));
        assert!(text.contains("OpenSSH (v8.9)"));
        assert!(text.contains("N/A"));
    }

    #[test]
    fn warns_and_handles_empty_results() {
        let a = Analysis {
            source: Some("text".to_owned()),
            warning: Some("Results may be incomplete.".to_owned()),
            hosts: Vec::new(),
        };
        let text = render(&a);
        assert!(text.contains("Notice: Results may be incomplete. (parsed from: text)"));
        assert!(text.contains("No host information found"));

        let mut bare = host();
        bare.ports.clear();
        let text = render(&Analysis {
            hosts: vec![bare],
            ..Analysis::default()
        });
        assert!(text.contains("No open ports found for this host."));
        assert!(text.starts_with("Parsed from: unknown output"));
    }
}

//! Managed host-based access rules.
//!
//! A role's access permission is enforced by a block of `host` lines at the
//! top of `pg_hba.conf`, tagged with a marker comment so later changes can
//! replace them. The first matching hba line wins, so placing the block first
//! makes it take precedence over the image's catch-all rules.

use std::net::IpAddr;

use crate::error::PanelError;

const MARKER_PREFIX: &str = "# pgpanel:";

/// Source addresses a role may connect from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Any IPv4 or IPv6 host (`%`).
    AnyHost,
    /// Explicit address blocks; everything else is rejected.
    Hosts(Vec<String>),
}

impl AccessScope {
    /// Parse a permission string.
    ///
    /// Accepts `%`, `localhost`, single addresses, CIDR blocks, and
    /// comma-separated lists of addresses and blocks.
    pub fn parse(permission: &str) -> Result<Self, PanelError> {
        let permission = permission.trim();
        if permission.is_empty() {
            return Err(PanelError::invalid_input("Permission must not be empty"));
        }
        if permission == "%" {
            return Ok(Self::AnyHost);
        }

        let mut blocks = Vec::new();
        for entry in permission.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if entry.eq_ignore_ascii_case("localhost") {
                blocks.push("127.0.0.1/32".to_string());
                blocks.push("::1/128".to_string());
                continue;
            }
            blocks.push(parse_block(entry)?);
        }
        if blocks.is_empty() {
            return Err(PanelError::invalid_input("Permission must not be empty"));
        }
        Ok(Self::Hosts(blocks))
    }
}

fn parse_block(entry: &str) -> Result<String, PanelError> {
    let invalid = || PanelError::invalid_input(format!("Invalid host or network: {entry}"));
    let (addr, prefix) = match entry.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (entry, None),
    };
    let ip: IpAddr = addr.parse().map_err(|_| invalid())?;
    let max = if ip.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix {
        Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
        None => max,
    };
    if prefix > max {
        return Err(invalid());
    }
    Ok(format!("{ip}/{prefix}"))
}

/// Tag closing every managed line. Separator, comment and whitespace
/// characters in names are percent-encoded, so a tag never contains another.
fn marker(database: &str, username: &str) -> String {
    format!("{MARKER_PREFIX}{}:{}", encode_tag_part(database), encode_tag_part(username))
}

fn encode_tag_part(part: &str) -> String {
    let mut encoded = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '%' | ':' | '#') || c.is_whitespace() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

fn tag_of(line: &str) -> Option<&str> {
    line.rfind(MARKER_PREFIX).map(|at| line[at..].trim_end())
}

fn hba_database(database: &str) -> String {
    if database.is_empty() {
        "all".to_string()
    } else {
        format!("\"{database}\"")
    }
}

/// Render the managed rules for one role.
pub fn render_rules(database: &str, username: &str, scope: &AccessScope, method: &str) -> Vec<String> {
    let tag = marker(database, username);
    let db = hba_database(database);
    let user = format!("\"{username}\"");
    let rule = |address: &str, method: &str| format!("host {db} {user} {address} {method} {tag}");

    match scope {
        AccessScope::AnyHost => vec![rule("0.0.0.0/0", method), rule("::/0", method)],
        AccessScope::Hosts(blocks) => {
            let mut lines: Vec<String> = blocks.iter().map(|b| rule(b, method)).collect();
            lines.push(rule("all", "reject"));
            lines
        }
    }
}

/// Drop the managed rules of one role, keeping everything else.
pub fn remove_rules(lines: &[String], database: &str, username: &str) -> Vec<String> {
    let tag = marker(database, username);
    lines.iter().filter(|line| tag_of(line) != Some(tag.as_str())).cloned().collect()
}

/// Replace the managed rules of one role and put them at the top.
pub fn apply_rules(
    lines: &[String],
    database: &str,
    username: &str,
    scope: &AccessScope,
    method: &str,
) -> Vec<String> {
    let mut result = render_rules(database, username, scope, method);
    result.extend(remove_rules(lines, database, username).into_iter().map(|l| l.replace('\t', " ")));
    result
}

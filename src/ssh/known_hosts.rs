/// SSH host key verification against ~/.ssh/known_hosts.
///
/// The decision depends on [`HostKeyPolicy`]:
/// - `AcceptAny`: no lookup at all
/// - `AcceptNew`: unknown hosts are accepted and appended
/// - `Strict`: unknown hosts are rejected
///
/// Under both checking policies a changed key or a revoked key is rejected.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use hmac::{Hmac, Mac};
use sha1::Sha1;

use russh_keys::key::PublicKey as RusshPublicKey;
use russh_keys::PublicKeyBase64;

use crate::models::connection::HostKeyPolicy;
use crate::models::error::SshError;

/// Result of checking a host key against known_hosts
#[derive(Debug)]
pub enum HostKeyCheckResult {
    /// Key matches a known entry
    Matched,
    /// Host not found in known_hosts (first connection)
    Unknown {
        key_type: String,
        fingerprint: String,
    },
    /// Key does NOT match the stored entry (possible MITM)
    Mismatch {
        expected_fingerprint: String,
        actual_fingerprint: String,
    },
    /// Host key has been revoked
    Revoked,
}

/// Why a server key was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyRejection {
    Mismatch { expected: String, actual: String },
    Revoked,
    Unknown { fingerprint: String },
    Unreadable(String),
}

impl HostKeyRejection {
    pub fn into_error(self, hostname: &str, port: u16) -> SshError {
        let reason = match self {
            HostKeyRejection::Mismatch { expected, actual } => format!(
                "Host key has changed!\nPort: {}\nExpected: {}\nReceived: {}",
                port, expected, actual
            ),
            HostKeyRejection::Revoked => "Host key has been revoked".to_string(),
            HostKeyRejection::Unknown { fingerprint } => format!(
                "Host is not in known_hosts (port {}, key {})",
                port, fingerprint
            ),
            HostKeyRejection::Unreadable(e) => e,
        };
        SshError::HostKeyVerificationFailed {
            hostname: hostname.to_string(),
            reason,
        }
    }
}

/// Apply `policy` to a server key. `Ok(())` means the handshake may continue.
pub fn verify_host_key(
    policy: HostKeyPolicy,
    hostname: &str,
    port: u16,
    server_key: &RusshPublicKey,
) -> Result<(), HostKeyRejection> {
    if policy == HostKeyPolicy::AcceptAny {
        tracing::debug!(
            "Accepting host key {} for {}:{} without verification",
            server_key.fingerprint(),
            hostname,
            port
        );
        return Ok(());
    }

    let result = check_host_key(hostname, port, server_key)
        .map_err(|e| HostKeyRejection::Unreadable(e.to_string()))?;
    decide(policy, hostname, port, server_key, result)
}

fn decide(
    policy: HostKeyPolicy,
    hostname: &str,
    port: u16,
    server_key: &RusshPublicKey,
    result: HostKeyCheckResult,
) -> Result<(), HostKeyRejection> {
    match result {
        HostKeyCheckResult::Matched => {
            tracing::debug!("Host key verified for {}:{}", hostname, port);
            Ok(())
        }
        HostKeyCheckResult::Unknown { key_type, fingerprint } => {
            if policy == HostKeyPolicy::Strict {
                tracing::error!(
                    "Unknown host key for {}:{} ({} {}), rejecting",
                    hostname, port, key_type, fingerprint
                );
                return Err(HostKeyRejection::Unknown { fingerprint });
            }
            tracing::info!(
                "Unknown host key for {}:{} ({} {}), auto-accepting",
                hostname, port, key_type, fingerprint
            );
            if let Err(e) = add_host_key(hostname, port, server_key) {
                tracing::warn!("Failed to save host key to known_hosts: {}", e);
            }
            Ok(())
        }
        HostKeyCheckResult::Mismatch { expected_fingerprint, actual_fingerprint } => {
            tracing::error!(
                "HOST KEY MISMATCH for {}:{}, possible MITM attack! Expected {}, got {}",
                hostname, port, expected_fingerprint, actual_fingerprint
            );
            Err(HostKeyRejection::Mismatch {
                expected: expected_fingerprint,
                actual: actual_fingerprint,
            })
        }
        HostKeyCheckResult::Revoked => {
            tracing::error!("Host key for {}:{} has been REVOKED", hostname, port);
            Err(HostKeyRejection::Revoked)
        }
    }
}

fn known_hosts_path() -> Result<PathBuf, SshError> {
    dirs::home_dir()
        .map(|h| h.join(".ssh").join("known_hosts"))
        .ok_or_else(|| SshError::InvalidConfiguration("Could not determine home directory".to_string()))
}

fn host_label(hostname: &str, port: u16) -> String {
    if port == 22 {
        hostname.to_string()
    } else {
        format!("[{}]:{}", hostname, port)
    }
}

/// Check a server's public key against ~/.ssh/known_hosts.
pub fn check_host_key(
    hostname: &str,
    port: u16,
    server_key: &RusshPublicKey,
) -> Result<HostKeyCheckResult, SshError> {
    let known_hosts_path = known_hosts_path()?;

    let content = match fs::read_to_string(&known_hosts_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(HostKeyCheckResult::Unknown {
                key_type: server_key.name().to_string(),
                fingerprint: server_key.fingerprint(),
            });
        }
        Err(e) => {
            return Err(SshError::HostKeyVerificationFailed {
                hostname: hostname.to_string(),
                reason: format!("Failed to read known_hosts: {}", e),
            });
        }
    };

    Ok(check_host_key_against_content(hostname, port, server_key, &content))
}

/// Check against known_hosts content (separated for testability).
fn check_host_key_against_content(
    hostname: &str,
    port: u16,
    server_key: &RusshPublicKey,
    content: &str,
) -> HostKeyCheckResult {
    let server_key_bytes = server_key.public_key_bytes();
    let label = host_label(hostname, port);

    let parser = ssh_key::known_hosts::KnownHosts::new(content);
    let mut first_mismatch_fingerprint: Option<String> = None;

    for entry in parser.flatten() {
        if !host_matches(entry.host_patterns(), hostname, &label) {
            continue;
        }

        if entry.marker() == Some(&ssh_key::known_hosts::Marker::Revoked) {
            if keys_equal(&server_key_bytes, entry.public_key()) {
                return HostKeyCheckResult::Revoked;
            }
            continue;
        }

        if keys_equal(&server_key_bytes, entry.public_key()) {
            return HostKeyCheckResult::Matched;
        } else if first_mismatch_fingerprint.is_none() {
            first_mismatch_fingerprint = Some(format_fingerprint(entry.public_key()));
        }
    }

    match first_mismatch_fingerprint {
        Some(expected_fingerprint) => HostKeyCheckResult::Mismatch {
            expected_fingerprint,
            actual_fingerprint: server_key.fingerprint(),
        },
        None => HostKeyCheckResult::Unknown {
            key_type: server_key.name().to_string(),
            fingerprint: server_key.fingerprint(),
        },
    }
}

/// Append a new host key entry to ~/.ssh/known_hosts.
pub fn add_host_key(
    hostname: &str,
    port: u16,
    server_key: &RusshPublicKey,
) -> Result<(), SshError> {
    let known_hosts_path = known_hosts_path()?;
    let write_err = |what: &str, e: std::io::Error| SshError::HostKeyVerificationFailed {
        hostname: hostname.to_string(),
        reason: format!("{}: {}", what, e),
    };

    if let Some(parent) = known_hosts_path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err("Failed to create ~/.ssh directory", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700)) {
                tracing::warn!("Failed to set ~/.ssh directory permissions: {}", e);
            }
        }
    }

    let label = host_label(hostname, port);
    let algo = server_key.name();
    let line = format!("{} {} {}\n", label, algo, server_key.public_key_base64());

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&known_hosts_path)
        .map_err(|e| write_err("Failed to open known_hosts for writing", e))?;

    file.write_all(line.as_bytes())
        .map_err(|e| write_err("Failed to write to known_hosts", e))?;

    tracing::info!("Added {} host key for {} to known_hosts", algo, label);
    Ok(())
}

/// Check if the entry's host patterns match the given hostname.
fn host_matches(
    patterns: &ssh_key::known_hosts::HostPatterns,
    hostname: &str,
    host_label: &str,
) -> bool {
    match patterns {
        ssh_key::known_hosts::HostPatterns::Patterns(pats) => {
            let mut matched = false;
            for pat in pats {
                if let Some(negated) = pat.strip_prefix('!') {
                    if glob_match(negated, host_label) || glob_match(negated, hostname) {
                        return false;
                    }
                } else if glob_match(pat, host_label) || glob_match(pat, hostname) {
                    matched = true;
                }
            }
            matched
        }
        ssh_key::known_hosts::HostPatterns::HashedName { salt, hash } => {
            hash_matches(salt, hash, host_label) || hash_matches(salt, hash, hostname)
        }
    }
}

/// Check if HMAC-SHA1(salt, name) == hash
fn hash_matches(salt: &[u8], expected_hash: &[u8; 20], name: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(salt) else {
        return false;
    };
    mac.update(name.as_bytes());
    let result = mac.finalize().into_bytes();
    result.as_slice() == expected_hash
}

/// Glob matching with `*` and `?`
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_inner(&p, &t)
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some('*'), _) => {
            glob_match_inner(&pattern[1..], text)
                || (!text.is_empty() && glob_match_inner(pattern, &text[1..]))
        }
        (Some('?'), Some(_)) => glob_match_inner(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if *p == *t => glob_match_inner(&pattern[1..], &text[1..]),
        _ => false,
    }
}

fn keys_equal(russh_bytes: &[u8], ssh_key_pub: &ssh_key::PublicKey) -> bool {
    match ssh_key::PublicKey::from_bytes(russh_bytes) {
        Ok(parsed) => parsed.key_data() == ssh_key_pub.key_data(),
        Err(_) => false,
    }
}

/// SHA256:base64 fingerprint of a known_hosts key
fn format_fingerprint(key: &ssh_key::PublicKey) -> String {
    use sha2::{Digest, Sha256};
    use ssh_encoding::Encode;

    let mut bytes = Vec::new();
    if key.key_data().encode(&mut bytes).is_ok() {
        let hash = Sha256::digest(&bytes);
        format!("SHA256:{}", data_encoding::BASE64_NOPAD.encode(&hash))
    } else {
        "unknown".to_string()
    }
}

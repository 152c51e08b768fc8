//! Configuration validation

use super::{Config, ProtocolKind, SourceKind};
use crate::dataplane::{ConnStatus, SocketState};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_source(config, &mut result);
    validate_sockets(config, &mut result);
    validate_conntrack(config, &mut result);

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    if !config.logging.level_is_valid() {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            config.logging.level
        ));
    }
}

fn validate_source(config: &Config, result: &mut ValidationResult) {
    match config.source.kind {
        SourceKind::Procfs if !config.sockets.is_empty() => {
            result.warn(format!(
                "source.kind is procfs: {} static socket(s) ignored",
                config.sockets.len()
            ));
        }
        SourceKind::Static if config.sockets.is_empty() => {
            result.warn("sockets: no sockets defined, every lookup will miss");
        }
        _ => {}
    }
}

fn validate_sockets(config: &Config, result: &mut ValidationResult) {
    for (i, socket) in config.sockets.iter().enumerate() {
        let Some(state) = socket.socket_state() else {
            result.error(format!(
                "sockets[{}]: unknown state '{}'",
                i,
                socket.state_name()
            ));
            continue;
        };

        if let Some(remote) = socket.remote {
            if remote.is_ipv4() != socket.local.is_ipv4() {
                result.error(format!(
                    "sockets[{}]: local {} and remote {} are different address families",
                    i, socket.local, remote
                ));
            }
        }

        match socket.protocol {
            ProtocolKind::Udp if !state.valid_for_udp() => {
                result.error(format!(
                    "sockets[{}]: '{}' is not a UDP socket state",
                    i, state
                ));
            }
            ProtocolKind::Tcp if state == SocketState::Listen && socket.remote.is_some() => {
                result.error(format!(
                    "sockets[{}]: listening socket cannot have a remote address",
                    i
                ));
            }
            ProtocolKind::Tcp if state != SocketState::Listen && socket.remote.is_none() => {
                result.warn(format!(
                    "sockets[{}]: {} socket without remote address never matches",
                    i, state
                ));
            }
            _ => {}
        }
    }
}

fn validate_conntrack(config: &Config, result: &mut ValidationResult) {
    for (i, conn) in config.conntrack.iter().enumerate() {
        let mut addresses = conn.addresses();
        if let Some(first) = addresses.next() {
            if addresses.any(|a| a.is_ipv4() != first.is_ipv4()) {
                result.error(format!(
                    "conntrack[{}]: tuples mix address families",
                    i
                ));
            }
        }

        let status = match conn.status_flags() {
            Ok(status) => status,
            Err(name) => {
                result.error(format!("conntrack[{}]: unknown status '{}'", i, name));
                continue;
            }
        };

        if status.contains(ConnStatus::SRC_NAT_DONE) && !status.contains(ConnStatus::SRC_NAT) {
            result.warn(format!(
                "conntrack[{}]: src_nat_done set without src_nat",
                i
            ));
        }

        if conn.reply_src.is_some() != conn.reply_dst.is_some() {
            result.warn(format!(
                "conntrack[{}]: only one of reply_src/reply_dst given, the other is derived",
                i
            ));
        }
    }
}

//! Answering unauthenticated status queries
//!
//! [`StatusSession`] guards the exchange on one connection so it is answered
//! at most once; [`StatusAggregator`] produces the answer, either from local
//! configuration alone or by probing backends and merging what they report.

mod aggregator;
mod session;

pub use aggregator::{merge, ProbeOutcome, StatusAggregator, StatusQueryContext};
pub use session::{InboundConnection, SessionState, StatusSession};

use crate::config::ProxyConfig;
use shared::{ModInfo, Players, ProtocolVersion, ServerPing, Version, PROXY_NAME, SUPPORTED_VERSION_STRING};

/// Builds the status answer from local configuration and player count.
/// Does no I/O and cannot fail.
pub fn local_ping(config: &ProxyConfig, version: ProtocolVersion, online: usize) -> ServerPing {
    ServerPing {
        version: Version {
            protocol: version.0,
            name: format!("{} {}", PROXY_NAME, SUPPORTED_VERSION_STRING),
        },
        players: Some(Players {
            online: i32::try_from(online).unwrap_or(i32::MAX),
            max: config.show_max_players,
            sample: Vec::new(),
        }),
        description: config.motd.clone(),
        favicon: config.favicon.clone(),
        mod_info: config.announce_forge.then(ModInfo::forge_default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ping_reflects_config() {
        let mut config = ProxyConfig::default();
        config.motd = "Welcome".to_string();
        config.show_max_players = 42;
        config.favicon = Some("data:image/png;base64,AAAA".to_string());

        let ping = local_ping(&config, ProtocolVersion(340), 3);

        assert_eq!(ping.version.protocol, 340);
        assert_eq!(ping.version.name, "Relay 1.8-1.20.1");
        assert_eq!(ping.description, "Welcome");
        assert_eq!(ping.favicon, config.favicon);
        let players = ping.players.unwrap();
        assert_eq!(players.online, 3);
        assert_eq!(players.max, 42);
        assert!(players.sample.is_empty());
        assert!(ping.mod_info.is_none());
    }

    #[test]
    fn test_local_ping_announces_forge() {
        let mut config = ProxyConfig::default();
        config.announce_forge = true;

        let ping = local_ping(&config, ProtocolVersion::MAXIMUM, 0);

        assert_eq!(ping.mod_info, Some(ModInfo::forge_default()));
    }
}

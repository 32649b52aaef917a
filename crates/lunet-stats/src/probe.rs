//! Ordered capability probes for reading counters.

use lunet_xray::{XrayError, is_stat_missing_error, is_unsupported_error};

/// One way of reading stats, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatProbe {
    /// `xray.app.stats.command.StatsService` over grpcurl.
    GrpcXray,
    /// Legacy `v2ray.core.app.stats.command.StatsService` over grpcurl.
    GrpcV2ray,
    /// `xray api stats -name`.
    CliStats,
    /// `xray api statsquery -pattern`.
    CliQuery,
}

impl StatProbe {
    /// Point-read order.
    pub const CHAIN: [Self; 4] = [Self::GrpcXray, Self::GrpcV2ray, Self::CliStats, Self::CliQuery];

    /// Bulk snapshot sources.
    pub const SNAPSHOT_CHAIN: [Self; 3] = [Self::GrpcXray, Self::GrpcV2ray, Self::CliQuery];

    pub fn name(self) -> &'static str {
        match self {
            Self::GrpcXray => "grpc_xray",
            Self::GrpcV2ray => "grpc_v2ray",
            Self::CliStats => "cli_stats",
            Self::CliQuery => "cli_query",
        }
    }

    fn service(self) -> Option<&'static str> {
        match self {
            Self::GrpcXray => Some("xray.app.stats.command.StatsService"),
            Self::GrpcV2ray => Some("v2ray.core.app.stats.command.StatsService"),
            Self::CliStats | Self::CliQuery => None,
        }
    }

    /// Full `GetStats` method, for RPC probes.
    pub fn get_stats_method(self) -> Option<String> {
        self.service().map(|s| format!("{s}/GetStats"))
    }

    /// Full `QueryStats` method, for RPC probes.
    pub fn query_stats_method(self) -> Option<String> {
        self.service().map(|s| format!("{s}/QueryStats"))
    }

    /// Whether `err` moves the read on to the next probe.
    ///
    /// RPC probes advance only when the service is not reachable under
    /// their namespace; any other answer from the proxy is final.
    pub fn advances_on(self, err: &XrayError) -> bool {
        match self {
            Self::GrpcXray | Self::GrpcV2ray => {
                err.is_transport_failure() || is_unsupported_error(&err.detail())
            }
            Self::CliStats => true,
            Self::CliQuery => false,
        }
    }
}

/// Whether the proxy answered that the counter does not exist.
pub(crate) fn is_missing(err: &XrayError) -> bool {
    matches!(err, XrayError::Rejected { .. }) && is_stat_missing_error(&err.detail())
}

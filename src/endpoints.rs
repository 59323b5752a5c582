use std::fmt;

/// Fixed OpenTSDB HTTP API surface, relative to the configured host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Put,
    Query,
    QueryLast,
    Aggregators,
    Config,
    Serializers,
    Stats,
    Suggest,
    Version,
    DropCaches,
    Annotation,
    BulkAnnotation,
    UidMetaData,
    UidAssign,
    TsMetaData,
}

impl Endpoint {
    pub const ALL: [Endpoint; 15] = [
        Endpoint::Put,
        Endpoint::Query,
        Endpoint::QueryLast,
        Endpoint::Aggregators,
        Endpoint::Config,
        Endpoint::Serializers,
        Endpoint::Stats,
        Endpoint::Suggest,
        Endpoint::Version,
        Endpoint::DropCaches,
        Endpoint::Annotation,
        Endpoint::BulkAnnotation,
        Endpoint::UidMetaData,
        Endpoint::UidAssign,
        Endpoint::TsMetaData,
    ];

    pub const fn path(&self) -> &'static str {
        match self {
            Endpoint::Put => PUT_PATH,
            Endpoint::Query => QUERY_PATH,
            Endpoint::QueryLast => QUERY_LAST_PATH,
            Endpoint::Aggregators => AGGREGATORS_PATH,
            Endpoint::Config => CONFIG_PATH,
            Endpoint::Serializers => SERIALIZERS_PATH,
            Endpoint::Stats => STATS_PATH,
            Endpoint::Suggest => SUGGEST_PATH,
            Endpoint::Version => VERSION_PATH,
            Endpoint::DropCaches => DROPCACHES_PATH,
            Endpoint::Annotation => ANNOTATION_PATH,
            Endpoint::BulkAnnotation => BULK_ANNOTATION_PATH,
            Endpoint::UidMetaData => UID_META_DATA_PATH,
            Endpoint::UidAssign => UID_ASSIGN_PATH,
            Endpoint::TsMetaData => TS_META_DATA_PATH,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

pub const PUT_PATH: &str = "/api/put";
pub const QUERY_PATH: &str = "/api/query";
pub const QUERY_LAST_PATH: &str = "/api/query/last";
pub const AGGREGATORS_PATH: &str = "/api/aggregators";
pub const CONFIG_PATH: &str = "/api/config";
pub const SERIALIZERS_PATH: &str = "/api/serializers";
pub const STATS_PATH: &str = "/api/stats";
pub const SUGGEST_PATH: &str = "/api/suggest";
pub const VERSION_PATH: &str = "/api/version";
pub const DROPCACHES_PATH: &str = "/api/dropcaches";
pub const ANNOTATION_PATH: &str = "/api/annotation";
pub const BULK_ANNOTATION_PATH: &str = "/api/annotation/bulk";
pub const UID_META_DATA_PATH: &str = "/api/uid/uidmeta";
pub const UID_ASSIGN_PATH: &str = "/api/uid/assign";
pub const TS_META_DATA_PATH: &str = "/api/uid/tsmeta";

/// Query parameter asking `/api/put` for a summary response.
pub const PUT_RESP_WITH_SUMMARY: &str = "summary";
/// Query parameter asking `/api/put` for a detailed response.
pub const PUT_RESP_WITH_DETAILS: &str = "details";

// Keys of a query's rateOptions map.
pub const QUERY_RATE_OPTION_COUNTER: &str = "counter";
pub const QUERY_RATE_OPTION_COUNTER_MAX: &str = "counterMax";
pub const QUERY_RATE_OPTION_RESET_VALUE: &str = "resetValue";

// Only one of these types is accepted by suggest and uid-meta requests.
pub const TYPE_METRICS: &str = "metrics";
pub const TYPE_TAGK: &str = "tagk";
pub const TYPE_TAGV: &str = "tagv";

pub const ANNOTATION_QUERY_START_TIME: &str = "start_time";
pub const ANNOTATION_QUERY_TSUID: &str = "tsuid";

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_endpoint_has_a_distinct_api_path() {
        let paths: HashSet<_> = Endpoint::ALL.iter().map(Endpoint::path).collect();
        assert_eq!(paths.len(), Endpoint::ALL.len());
        assert!(paths.iter().all(|p| p.starts_with("/api/")));
    }

    #[test]
    fn display_matches_path() {
        assert_eq!(Endpoint::BulkAnnotation.to_string(), "/api/annotation/bulk");
        assert_eq!(Endpoint::UidAssign.to_string(), "/api/uid/assign");
    }
}

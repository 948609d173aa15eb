/// Sole source node of every topology graph.
pub const START_GATEWAY: &str = "start-gateway";
/// Sole sink node of every topology graph.
pub const END_GATEWAY: &str = "end-gateway";
/// Endpoint serving any request not bound to a specific handler.
pub const DEFAULT_ENDPOINT: &str = "/default";
/// Wildcard key in endpoint-specific polling maps.
pub const WILDCARD_ENDPOINT: &str = "*";

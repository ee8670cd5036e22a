//! MCP method name constants.
//!
//! Grouped by direction: most requests flow client to server; `ping` may
//! flow either way; `roots/list` and `sampling/createMessage` flow server
//! to client.

/// Handshake request.
pub const INITIALIZE: &str = "initialize";
/// Handshake-complete notification.
pub const INITIALIZED: &str = "notifications/initialized";
/// Liveness check, either direction.
pub const PING: &str = "ping";

/// List registered tools.
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool.
pub const TOOLS_CALL: &str = "tools/call";

/// List registered prompts.
pub const PROMPTS_LIST: &str = "prompts/list";
/// Render a prompt.
pub const PROMPTS_GET: &str = "prompts/get";

/// List static resources.
pub const RESOURCES_LIST: &str = "resources/list";
/// List resource templates.
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// Read a resource by URI.
pub const RESOURCES_READ: &str = "resources/read";
/// Subscribe to updates for a URI.
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// Drop a subscription.
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

/// Server asks the client for its root directories.
pub const ROOTS_LIST: &str = "roots/list";
/// Server asks the client to run an LLM completion.
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// Argument completion.
pub const COMPLETION_COMPLETE: &str = "completion/complete";
/// Set the minimum level for log notifications.
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// Progress report for a token-carrying request.
pub const NOTIF_PROGRESS: &str = "notifications/progress";
/// Cancel an in-flight request.
pub const NOTIF_CANCELLED: &str = "notifications/cancelled";
/// Server-to-client log event.
pub const NOTIF_MESSAGE: &str = "notifications/message";
/// Tool registry changed.
pub const NOTIF_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// Prompt registry changed.
pub const NOTIF_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
/// Resource registry changed.
pub const NOTIF_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// A subscribed resource changed.
pub const NOTIF_RESOURCES_UPDATED: &str = "notifications/resources/updated";
/// Client root set changed.
pub const NOTIF_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

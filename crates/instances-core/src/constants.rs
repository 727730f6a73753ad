//! Constants shared across the Instances crates.

/// Version stamped into every persisted document.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// File name of the primary persisted document.
pub const CONFIG_FILE_NAME: &str = "InstancesModConfig.json";

/// File name of the staging (write-ahead) copy of the persisted document.
pub const STAGING_FILE_NAME: &str = "InstancesModConfig.temp.json";

/// Group policy used when creating a fresh online session.
pub const GROUP_ID: &str = "SFW";

/// Minutes after shutdown during which a rejoin may still teleport the
/// participant back to the stored position.
pub const TELEPORT_TIMEOUT_MINUTES: i64 = 5;

/// Number of detail lookups attempted after creating a session.
pub const CREATE_JOIN_ATTEMPTS: u32 = 3;

/// Launch argument token marking a process relaunched by this subsystem.
pub const RESTART_MARKER: &str = "--instances-owo-what-is-dis";

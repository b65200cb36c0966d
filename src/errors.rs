use thiserror::Error;

/// Errors that can arise while configuring networks, persisting state or decoding messages.
#[derive(Debug, Error)]
pub enum StashError {
    /// Wrapper around IO errors (config directory scans, fixture files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A world fixture could not be parsed.
    #[error("fixture error: {0}")]
    Fixture(#[from] toml::de::Error),

    /// Returned when an operation names a network that does not exist.
    #[error("network not found: {0}")]
    NetworkNotFound(String),

    /// Returned when creating or renaming onto an existing network name.
    #[error("network already exists: {0}")]
    DuplicateNetwork(String),

    /// The requested master container already anchors another network.
    #[error("container {master:#010X} is already the master of network '{network}'")]
    MasterInUse { master: u32, network: String },

    /// Whoosh was requested before the network's whoosh set was configured.
    #[error("whoosh not configured for network: {0}")]
    WhooshNotConfigured(String),

    /// Returned when activating a preset that was never loaded (or was pruned).
    #[error("preset not found: {0}")]
    PresetNotFound(String),

    /// Returned when toggling a container list that was never loaded.
    #[error("container list not found: {0}")]
    ContainerListNotFound(String),

    /// Returned when a vendor operation names an unregistered NPC.
    #[error("vendor not registered: {0:#010X}")]
    VendorNotFound(u32),

    /// The player cannot pay for the requested action.
    #[error("insufficient gold: need {needed}, have {available}")]
    InsufficientGold { needed: i32, available: i32 },

    /// Save data ended before a record was complete.
    #[error("truncated save data in record {record}")]
    Truncated { record: String },

    /// Returned when decoding a record with an unexpected version.
    #[error("version mismatch for {record}: expected {expected}, got {found}")]
    VersionMismatch {
        record: String,
        expected: u32,
        found: u32,
    },

    /// A string in save data or a message was not valid UTF-8.
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A cross-plugin message did not match its declared layout.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

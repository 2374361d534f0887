use thiserror::Error;

#[derive(Error, Debug)]
pub enum PartsError {
    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Open tunnel to database first (nothing listening on localhost:{port})")]
    TunnelClosed { port: u16 },

    #[error("Database query failed with status {status}: {body}")]
    QueryFailed { status: u16, body: String },

    #[error("Malformed database response: {message}")]
    MalformedResponse { message: String },

    #[error("Part type '{kind}' is not supported here")]
    InvalidPartKind { kind: String },

    #[error("Barcode '{barcode}' is not numeric")]
    InvalidBarcode { barcode: String },

    #[error("Could not find parent with id {parent_id} for daughter part {barcode}")]
    MissingParent { parent_id: String, barcode: String },

    #[error("Expression error in '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("Module {barcode}: {reason} (file: {source_path})")]
    Category {
        barcode: String,
        reason: String,
        source_path: String,
        dump: String,
    },

    #[error("Histogram '{name}' not found in {source_path}")]
    MissingHistogram { name: String, source_path: String },

    #[error("Plotting failed: {message}")]
    Plot { message: String },

    #[error("Command `{command}` failed with exit status {status}")]
    CommandFailed { command: String, status: i32 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Database,
    Data,
    Configuration,
    Filesystem,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PartsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PartsError::ApiError(_) | PartsError::TunnelClosed { .. } => ErrorCategory::Network,
            PartsError::QueryFailed { .. } | PartsError::MalformedResponse { .. } => {
                ErrorCategory::Database
            }
            PartsError::IoError(_) => ErrorCategory::Filesystem,
            PartsError::CommandFailed { .. } | PartsError::Plot { .. } => ErrorCategory::External,
            PartsError::ConfigError { .. }
            | PartsError::TomlError(_)
            | PartsError::ConfigValidationError { .. }
            | PartsError::InvalidConfigValueError { .. }
            | PartsError::MissingConfigError { .. }
            | PartsError::InvalidPartKind { .. } => ErrorCategory::Configuration,
            PartsError::JsonError(_)
            | PartsError::YamlError(_)
            | PartsError::RegexError(_)
            | PartsError::InvalidBarcode { .. }
            | PartsError::MissingParent { .. }
            | PartsError::Expression { .. }
            | PartsError::Category { .. }
            | PartsError::MissingHistogram { .. }
            | PartsError::ProcessingError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Database | ErrorCategory::Data | ErrorCategory::External => {
                ErrorSeverity::High
            }
            ErrorCategory::Configuration | ErrorCategory::Filesystem => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            PartsError::TunnelClosed { port } => {
                format!("Open tunnel to database first (port {}).", port)
            }
            PartsError::ApiError(_) => "Could not reach the parts database.".to_string(),
            PartsError::Category {
                barcode, reason, ..
            } => format!("Module {} could not be categorized: {}", barcode, reason),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check that the SSH tunnel to the database is open and the URL is correct"
            }
            ErrorCategory::Database => "Check the query and the database status, then retry",
            ErrorCategory::Data => "Inspect the input data and categorization rules",
            ErrorCategory::Configuration => "Review the configuration file and CLI flags",
            ErrorCategory::Filesystem => "Check that the paths exist and are writable",
            ErrorCategory::External => "Make sure the external tool is installed and on PATH",
        }
    }

    /// Process exit code used by the binaries.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, PartsError>;

use thiserror::Error;

/// Errors that can occur while handling an admission request
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration could not be loaded or compiled
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),

    /// The admitted object could not be decoded into a pod
    #[error("could not deserialize pod object: {0}")]
    Decode(#[source] serde_json::Error),

    /// A request for the workload kind arrived without an object
    #[error("admission request carries no object")]
    MissingObject,

    /// The resulting patch could not be attached to the response
    #[error("Patch Error: {0}")]
    Patch(#[from] kube::core::admission::SerializePatchError),

    /// The webhook server could not be started
    #[error("Server Error: {0}")]
    Server(String),
}

/// Errors detected while loading the configuration
///
/// All of these are reported before the server starts accepting requests.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`crate::Config`]
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A namespace or image pattern is not a valid regular expression
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A rule maps an image pattern to an empty secret name
    #[error("rule {namespace:?} -> {image:?} names an empty image pull secret")]
    EmptyCredential { namespace: String, image: String },

    /// An exempt namespace entry is empty
    #[error("exempt namespace entries must not be empty")]
    EmptyExemption,
}

/// Policy violations that deny an admission request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// `runAsNonRoot` is set while `runAsUser` selects the root user
    #[error("runAsNonRoot specified, but runAsUser set to 0 (the root user)")]
    RootUserConflict,
}

/// Result type for ipsa operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

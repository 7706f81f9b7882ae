use serde_json::Value;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by provider adapters and the session manager.
///
/// Nothing in this crate retries; every variant reaches the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The vendor script could not be fetched or executed.
    #[error("loading the {provider} SDK script")]
    Load {
        provider: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The vendor SDK threw while initializing.
    #[error("initializing the {provider} SDK")]
    VendorInit {
        provider: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The vendor answered the sign-in with an explicit error value.
    #[error("sign-in rejected by provider: {0}")]
    VendorAuth(Value),

    #[error("No user is currently logged in with {provider}")]
    NoSession { provider: &'static str },

    #[error("{provider} login provider is not initialized")]
    NotInitialized { provider: &'static str },

    #[error("a {provider} sign-in is already in progress")]
    SignInInProgress { provider: &'static str },

    #[error("{provider} sign-in response is missing the authorization or the user profile")]
    IncompleteResponse { provider: &'static str },

    #[error("unexpected sign-in response shape")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("vendor SDK call failed")]
    Sdk(#[source] anyhow::Error),

    #[error("accessing the session storage")]
    Storage(#[source] anyhow::Error),

    #[error("serializing the session")]
    Serialization(#[source] serde_json::Error),

    #[error("{operation} is not supported by {provider}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("Login providers not ready yet")]
    NotReady,

    #[error("No login provider found with id {0}")]
    UnknownProvider(String),

    #[error("Not logged in")]
    NotLoggedIn,
}

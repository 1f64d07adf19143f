#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MarketplaceError {
    #[error("Marketplace unreachable: {0}")]
    Unreachable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Request to `{url}` timed out.")]
    Timeout { url: String },

    #[error("Unexpected status code {status} from `{url}`.")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Failed to parse marketplace page: {message}")]
    ParseFailure { message: String },

    #[error("Invalid marketplace URL: {message}")]
    InvalidUrl { message: String },

    #[error("Failed to initialize HTTP client: {message}")]
    ClientInit { message: String },
}

impl From<wreq::Error> for MarketplaceError {
    fn from(e: wreq::Error) -> Self {
        MarketplaceError::Unreachable(Box::new(e))
    }
}

impl From<url::ParseError> for MarketplaceError {
    fn from(e: url::ParseError) -> Self {
        MarketplaceError::InvalidUrl {
            message: e.to_string(),
        }
    }
}

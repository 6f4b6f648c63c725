use stashup_core::error::is_stash_error_code;
use stashup_core::UploadError;

/// API error code the server returns when the CSRF token or OAuth session is rejected.
pub const BAD_TOKEN_CODE: &str = "badtoken";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {info}")]
    Api { code: String, info: String },

    #[error("Unexpected API response: {0}")]
    Decode(String),

    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which protocol step raised the error; decides how unclassified errors map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stash,
    Commit,
    Query,
    Edit,
}

impl ClientError {
    pub fn is_bad_token(&self) -> bool {
        matches!(self, ClientError::Api { code, .. } if code == BAD_TOKEN_CODE)
            || matches!(self, ClientError::Status { status, .. } if *status == 401)
    }

    pub fn into_upload_error(self, phase: Phase) -> UploadError {
        if self.is_bad_token() {
            return UploadError::InvalidLogin;
        }
        match self {
            ClientError::Api { code, info } if is_stash_error_code(&code) => {
                UploadError::Stash { code, info }
            }
            other => match phase {
                Phase::Stash | Phase::Query => UploadError::Network(other.to_string()),
                Phase::Commit => UploadError::Commit(other.to_string()),
                Phase::Edit => UploadError::SecondaryEdit(other.to_string()),
            },
        }
    }
}

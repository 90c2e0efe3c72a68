use async_trait::async_trait;

use crate::AuthError;

/// Human in the loop for the interactive login.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask for the second-factor one-time code.
    async fn one_time_code(&self) -> Result<String, AuthError>;

    /// Ask the operator to paste an `authorization` header value copied from
    /// the browser's developer tools.
    async fn manual_credential(&self) -> Result<String, AuthError>;
}

//! OAuth2 authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::Path;
use yup_oauth2::ApplicationSecret;

use crate::error::{AgentError, Result};

/// Scopes the agent needs: read and relabel mail, manage its labels, and
/// send summary emails to the account owner
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
    "https://www.googleapis.com/auth/gmail.send",
];

pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Resolve the OAuth client secret: the credentials file when it exists,
/// otherwise `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET` from the environment
pub async fn resolve_application_secret(credentials_path: &Path) -> Result<ApplicationSecret> {
    if credentials_path.exists() {
        return yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| AgentError::AuthError(format!("Failed to read credentials: {}", e)));
    }

    tracing::info!(
        "Credentials file {:?} not found, reading client secret from environment",
        credentials_path
    );
    load_credentials_from_env().map_err(|e| {
        AgentError::AuthError(format!(
            "No credentials file at {:?} and {}",
            credentials_path, e
        ))
    })
}

/// Authenticate and build a Gmail hub
///
/// Tokens are persisted to `token_cache_path` and refreshed automatically.
/// With `force`, any cached token is discarded first so the browser flow runs
/// again (useful after scopes change).
pub async fn authenticate(
    credentials_path: &Path,
    token_cache_path: &Path,
    force: bool,
) -> Result<GmailHub> {
    if force && token_cache_path.exists() {
        tokio::fs::remove_file(token_cache_path).await?;
        tracing::info!("Removed cached token at {:?}", token_cache_path);
    }

    let secret = resolve_application_secret(credentials_path).await?;

    if let Some(parent) = token_cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| AgentError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Request every scope up front so the cached token covers all of them
    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(|e| AgentError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| AgentError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Load OAuth2 client credentials from environment variables
///
/// - `GMAIL_CLIENT_ID`
/// - `GMAIL_CLIENT_SECRET`
/// - `GMAIL_REDIRECT_URI` (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| AgentError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| AgentError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri =
        env::var("GMAIL_REDIRECT_URI").unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token cache to the owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_resolve_secret_from_file() {
        let credentials_json = r#"{
            "installed": {
                "client_id": "file-client-id",
                "project_id": "test-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "file-secret",
                "redirect_uris": ["http://localhost:8080"]
            }
        }"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), credentials_json)
            .await
            .unwrap();

        let secret = resolve_application_secret(temp_file.path()).await.unwrap();
        assert_eq!(secret.client_id, "file-client-id");
        assert_eq!(secret.client_secret, "file-secret");
    }

    #[tokio::test]
    #[serial]
    async fn test_resolve_secret_falls_back_to_env() {
        env::set_var("GMAIL_CLIENT_ID", "env-id");
        env::set_var("GMAIL_CLIENT_SECRET", "env-secret");

        let dir = tempfile::tempdir().unwrap();
        let secret = resolve_application_secret(&dir.path().join("missing.json"))
            .await
            .unwrap();
        assert_eq!(secret.client_id, "env-id");

        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");
    }

    #[tokio::test]
    #[serial]
    async fn test_resolve_secret_missing_everywhere() {
        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");

        let dir = tempfile::tempdir().unwrap();
        let err = resolve_application_secret(&dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::AuthError(_)));
        assert!(err.to_string().contains("GMAIL_CLIENT_ID not set"));
    }

    #[tokio::test]
    async fn test_secure_token_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "token").await.unwrap();

        secure_token_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env() {
        env::set_var("GMAIL_CLIENT_ID", "test-id");
        env::set_var("GMAIL_CLIENT_SECRET", "test-secret");
        env::set_var("GMAIL_REDIRECT_URI", "http://localhost:9999");

        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.client_id, "test-id");
        assert_eq!(secret.redirect_uris[0], "http://localhost:9999");

        env::remove_var("GMAIL_REDIRECT_URI");
        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.redirect_uris[0], "http://localhost:8080");

        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");
    }

    #[test]
    fn test_scopes_include_send() {
        assert_eq!(REQUIRED_SCOPES.len(), 3);
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.modify"));
        assert!(REQUIRED_SCOPES.contains(&"https://www.googleapis.com/auth/gmail.send"));
    }
}

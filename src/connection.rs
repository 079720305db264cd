//! API server connection setup.
//!
//! Credential providers are registered explicitly, once, in a
//! [`CredentialRegistry`] that is handed to [`ConnectionConfig::connect`].
//! The selected provider gets the final say over the client's auth settings.

use crate::error::{MirrorError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Provider that leaves the kubeconfig's own credentials in place.
pub const KUBECONFIG_PROVIDER: &str = "kubeconfig";
pub const TOKEN_FILE_PROVIDER: &str = "token-file";

/// Supplies credentials for the API server connection.
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, config: &mut Config) -> Result<()>;
}

/// Uses whatever the kubeconfig or in-cluster environment provides.
pub struct KubeconfigProvider;

impl CredentialProvider for KubeconfigProvider {
    fn name(&self) -> &str {
        KUBECONFIG_PROVIDER
    }

    fn apply(&self, _config: &mut Config) -> Result<()> {
        Ok(())
    }
}

/// Bearer token read from a file, re-read by the client when it rotates.
pub struct TokenFileProvider {
    path: PathBuf,
}

impl TokenFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialProvider for TokenFileProvider {
    fn name(&self) -> &str {
        TOKEN_FILE_PROVIDER
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        if !self.path.is_file() {
            return Err(MirrorError::Configuration(format!(
                "token file {} does not exist",
                self.path.display()
            )));
        }
        config.auth_info.token = None;
        config.auth_info.token_file = Some(self.path.display().to_string());
        Ok(())
    }
}

/// Named credential providers available to the connection builder.
#[derive(Default)]
pub struct CredentialRegistry {
    providers: BTreeMap<String, Box<dyn CredentialProvider>>,
}

impl CredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the kubeconfig provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(KubeconfigProvider));
        registry
    }

    pub fn register(&mut self, provider: Box<dyn CredentialProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<&dyn CredentialProvider> {
        self.providers
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                MirrorError::Configuration(format!(
                    "unknown credential provider '{}' (available: {})",
                    name,
                    self.names().join(", ")
                ))
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

/// Where and how to reach the API server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Kubeconfig path; in-cluster or default inference when unset.
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub credential_provider: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            credential_provider: KUBECONFIG_PROVIDER.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Resolve the client configuration, including credentials.
    pub async fn load(&self, providers: &CredentialRegistry) -> Result<Config> {
        let provider = providers.get(&self.credential_provider)?;
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..Default::default()
        };

        let mut config = match (&self.kubeconfig, &self.context) {
            (Some(path), _) => {
                debug!("Loading kubeconfig from {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path)?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            (None, Some(_)) => Config::from_kubeconfig(&options).await?,
            (None, None) => Config::infer().await?,
        };

        provider.apply(&mut config)?;
        Ok(config)
    }

    pub async fn connect(&self, providers: &CredentialRegistry) -> Result<Client> {
        let config = self.load(providers).await?;
        info!(
            cluster = %config.cluster_url,
            provider = %self.credential_provider,
            "Connecting to API server"
        );
        Ok(Client::try_from(config)?)
    }
}

//! Provider factory for creating node providers based on configuration

use std::sync::Arc;
use std::time::Duration;

use super::{ChainNode, NodeError, SidecarNode};
use crate::config::NodeConfig;
use crate::utils::logging;

/// Factory for creating node providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create one provider per configured endpoint
    pub fn create_providers(config: &NodeConfig) -> Result<Vec<Arc<dyn ChainNode>>, NodeError> {
        if config.urls.is_empty() {
            return Err(NodeError::Config("NODE_URLS is empty".to_string()));
        }

        config
            .urls
            .iter()
            .enumerate()
            .map(|(index, url)| {
                Self::create_provider(url, config.evm_rpc_url(index), config.head_poll_interval_ms)
                    .map(|provider| {
                        logging::log_node_connection_details(index, url, config.evm_rpc_url(index));
                        provider
                    })
            })
            .collect()
    }

    /// Create a provider for a single endpoint
    pub fn create_provider(
        url: &str,
        evm_rpc_url: Option<&str>,
        head_poll_interval_ms: u64,
    ) -> Result<Arc<dyn ChainNode>, NodeError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NodeError::Config(format!(
                "unsupported node endpoint '{}', expected an http(s) gateway URL",
                url
            )));
        }
        Ok(Arc::new(SidecarNode::new(
            url,
            evm_rpc_url,
            Duration::from_millis(head_poll_interval_ms),
        )))
    }
}

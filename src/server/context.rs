//! Client context handed to the network services.

use std::path::{Path, PathBuf};

use crate::node::LocalClient;
use crate::server::client::GrpcClient;

/// What a service needs to reach the node. Each `with_*` returns a modified copy.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    client: Option<LocalClient>,
    home_dir: PathBuf,
    chain_id: String,
    grpc_client: Option<GrpcClient>,
}

impl ClientContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: LocalClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = home.into();
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    pub fn with_grpc_client(mut self, client: GrpcClient) -> Self {
        self.grpc_client = Some(client);
        self
    }

    pub fn client(&self) -> Option<&LocalClient> {
        self.client.as_ref()
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn grpc_client(&self) -> Option<&GrpcClient> {
        self.grpc_client.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_copy_instead_of_mutating() {
        let base = ClientContext::new().with_chain_id("chain-a");
        let api = base.clone().with_home_dir("/node").with_grpc_client(GrpcClient::new("127.0.0.1:9090"));

        assert_eq!(base.chain_id(), "chain-a");
        assert!(base.grpc_client().is_none());
        assert_eq!(api.home_dir(), Path::new("/node"));
        assert_eq!(api.grpc_client().map(GrpcClient::target), Some("127.0.0.1:9090"));
    }
}

//! Resolves a service name to the producer currently registered for it, by
//! querying the Network Manager's `/list` the same way `dqm4hep-probe` does.

use std::collections::HashMap;
use std::time::Duration;

use dqm_core::{NetError, NetResult, ServerInfo};
use dqm_transport::HttpClient;

/// Where to ask, and how, for the producer owning a given service.
pub(crate) struct ProducerLocator {
    http: HttpClient,
    list_url: String,
}

impl ProducerLocator {
    pub(crate) fn new(netmgr_host: &str, netmgr_port: u16) -> NetResult<Self> {
        Ok(Self {
            http: HttpClient::new(Duration::from_secs(5))?,
            list_url: format!("http://{netmgr_host}:{netmgr_port}/list"),
        })
    }

    /// Finds the `(host, port)` of the one registered server whose
    /// `services` map contains `name`. Fleet order is unspecified, so
    /// if more than one producer somehow advertises the same service the
    /// first one the JSON object yields wins.
    pub(crate) async fn find(&self, name: &str) -> NetResult<(String, u16)> {
        let body = self.http.get(&self.list_url).await?;
        let fleet: HashMap<String, ServerInfo> = serde_json::from_slice(&body)
            .map_err(|e| NetError::ProtocolError(format!("decoding /list response: {e}")))?;
        fleet
            .values()
            .find(|info| info.services.contains_key(name))
            .map(|info| (info.host.clone(), info.port))
            .ok_or_else(|| NetError::NotFound(format!("no producer registered for service {name}")))
    }
}

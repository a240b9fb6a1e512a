use std::collections::BTreeMap;

use url::Url;

use crate::error::{Result, RpcError};

pub const MGMT_HTTPS_PORT: u16 = 443;
pub const MD_HTTPS_PORT: u16 = 8444;
pub const BG_HTTPS_PORT: u16 = 8445;
pub const HOSTED_AGENTS_HTTPS_PORT: u16 = 8446;

/// Maps an api name onto the address serving it.
pub trait RpcRouter: Send + Sync {
    fn address_for(&self, api: &str) -> String;
}

impl<F> RpcRouter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn address_for(&self, api: &str) -> String {
        self(api)
    }
}

/// Routes the well known apis onto the management service ports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRouter {
    pub mgmt_addr: String,
    pub bg_addr: String,
    pub md_addr: String,
    pub hosted_agents_addr: String,
}

impl ServiceRouter {
    /// Same address for every api, used when only the management endpoint is known.
    pub fn single(addr: impl Into<String>) -> ServiceRouter {
        let addr = addr.into();
        ServiceRouter {
            mgmt_addr: addr.clone(),
            bg_addr: addr.clone(),
            md_addr: addr.clone(),
            hosted_agents_addr: addr,
        }
    }

    /// Derives the per-api addresses from a host, using the fixed service port layout.
    pub fn for_host(scheme: &str, host: &str) -> ServiceRouter {
        let addr = |port: u16| format!("{scheme}://{host}:{port}/rpc/");
        ServiceRouter {
            mgmt_addr: addr(MGMT_HTTPS_PORT),
            bg_addr: addr(BG_HTTPS_PORT),
            md_addr: addr(MD_HTTPS_PORT),
            hosted_agents_addr: addr(HOSTED_AGENTS_HTTPS_PORT),
        }
    }

    /// Builds a router from the address keys of a join secret.
    pub fn from_join_data(data: &BTreeMap<String, String>) -> Result<ServiceRouter> {
        let get = |key: &str| {
            data.get(key).cloned().ok_or_else(|| RpcError::InvalidAddress {
                address: String::new(),
                reason: format!("join data is missing {key}"),
            })
        };
        let router = ServiceRouter {
            mgmt_addr: get("mgmt_addr")?,
            bg_addr: get("bg_addr")?,
            md_addr: get("md_addr")?,
            hosted_agents_addr: get("hosted_agents_addr")?,
        };
        for addr in [
            &router.mgmt_addr,
            &router.bg_addr,
            &router.md_addr,
            &router.hosted_agents_addr,
        ] {
            AddressScheme::parse(addr)?;
        }
        Ok(router)
    }
}

impl RpcRouter for ServiceRouter {
    fn address_for(&self, api: &str) -> String {
        match api {
            "object_api" | "func_api" => self.md_addr.clone(),
            "scrubber_api" => self.bg_addr.clone(),
            "hosted_agents_api" => self.hosted_agents_addr.clone(),
            _ => self.mgmt_addr.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressScheme {
    /// `ws://` and `wss://`: multiplexed over one pooled connection.
    WebSocket,
    /// `http://` and `https://`: one PUT per call.
    Http,
}

impl AddressScheme {
    pub fn parse(address: &str) -> Result<AddressScheme> {
        let url = Url::parse(address).map_err(|e| RpcError::InvalidAddress {
            address: address.to_owned(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(AddressScheme::WebSocket),
            "http" | "https" => Ok(AddressScheme::Http),
            other => Err(RpcError::InvalidAddress {
                address: address.to_owned(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }
}

use reqwest::Method;

use crate::client::{CallError, Dispatch, Params, ServiceClient};

pub const LISTINGS_PATH: &str = "listings";

/// Listings endpoint, borrowed from a [`ServiceClient`] via [`ServiceClient::listings`].
#[derive(Clone, Copy, Debug)]
pub struct Listings<'a> {
    service: &'a ServiceClient,
}

impl<'a> Listings<'a> {
    pub fn new(service: &'a ServiceClient) -> Self {
        Self { service }
    }

    pub fn path(property_id: &str) -> String {
        format!("{LISTINGS_PATH}/{property_id}")
    }

    pub async fn listings(
        &self,
        method: Method,
        property_id: &str,
        params: Option<&Params>,
    ) -> Result<Dispatch, CallError> {
        self.service
            .call(method, &Self::path(property_id), params, None)
            .await
    }

    pub async fn get(
        &self,
        property_id: &str,
        params: Option<&Params>,
    ) -> Result<Dispatch, CallError> {
        self.listings(Method::GET, property_id, params).await
    }
}

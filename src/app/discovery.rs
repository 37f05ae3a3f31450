use std::collections::HashMap;

use coap_lite::link_format::{LINK_ATTR_OBSERVABLE, LINK_ATTR_RESOURCE_TYPE};
use coap_lite::{CoapRequest, CoapResponse, ContentFormat, Packet, RequestType, ResponseType};

use crate::app::coap_utils;
use crate::app::error::CoapError;
use crate::app::resource::ResourceEntry;

/// Well-known discovery path (RFC 6690), without the leading slash.
pub const WELL_KNOWN_CORE: &str = ".well-known/core";

#[derive(Debug, Clone)]
struct DiscoverableResource {
    /// Preformatted link so a discovery response is just a join of the matching ones.
    link_str: String,

    /// Attributes as strings that can be compared directly against query parameters such as
    /// `GET /.well-known/core?rt=Moisture`.
    attributes: HashMap<&'static str, String>,
}

impl From<&ResourceEntry> for DiscoverableResource {
    fn from(entry: &ResourceEntry) -> Self {
        let mut link_str = format!("</{}>", entry.path.trim_start_matches('/'));
        let mut attributes = HashMap::new();
        if !entry.resource_type.is_empty() {
            link_str.push_str(&format!(
                ";{LINK_ATTR_RESOURCE_TYPE}=\"{}\"",
                entry.resource_type
            ));
            attributes.insert(LINK_ATTR_RESOURCE_TYPE, entry.resource_type.clone());
        }
        if entry.observable {
            link_str.push_str(&format!(";{LINK_ATTR_OBSERVABLE}"));
            attributes.insert(LINK_ATTR_OBSERVABLE, String::new());
        }
        Self {
            link_str,
            attributes,
        }
    }
}

/// Serves `/.well-known/core` for every resource bound to the endpoint.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    resources: Vec<DiscoverableResource>,
}

impl Discovery {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a ResourceEntry>) -> Self {
        Self {
            resources: entries.into_iter().map(DiscoverableResource::from).collect(),
        }
    }

    pub fn is_discovery_path(path: &str) -> bool {
        path.trim_matches('/') == WELL_KNOWN_CORE
    }

    /// Link-format document listing the resources matching every `key=value` query.
    pub fn links(&self, queries: &HashMap<String, String>) -> String {
        self.resources
            .iter()
            .filter(|&r| filter_by_query(r, queries))
            .map(|r| r.link_str.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn respond<Endpoint>(&self, request: &CoapRequest<Endpoint>) -> Result<Packet, CoapError> {
        if !matches!(request.get_method(), RequestType::Get) {
            return Err(CoapError::for_code(
                ResponseType::MethodNotAllowed,
                "Discovery is GET only",
            ));
        }
        let mut response = CoapResponse::new(&request.message)
            .ok_or_else(|| CoapError::bad_request("Unanswerable discovery request"))?;
        let queries = coap_utils::request_get_queries(&request.message);
        response.message.payload = self.links(&queries).into_bytes();
        response.set_status(ResponseType::Content);
        response
            .message
            .set_content_format(ContentFormat::ApplicationLinkFormat);
        Ok(response.message)
    }
}

fn filter_by_query(resource: &DiscoverableResource, queries: &HashMap<String, String>) -> bool {
    for (key, value) in queries {
        if Some(value) != resource.attributes.get(key.as_str()) {
            return false;
        }
    }
    true
}

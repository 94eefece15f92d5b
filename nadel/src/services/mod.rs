//! Backing services and their registry.

use std::collections::HashMap;
use std::time::Duration;

use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use tower::buffer::Buffer;
use tower::util::BoxCloneService;
use tower::util::BoxService;
use tower::BoxError;
use tower::ServiceExt;

use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A call to a backing service.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct BackingRequest {
    pub service_name: String,
    pub operation_name: Option<String>,
    /// The printed query document. Batch arguments are inlined as literals.
    pub query: String,
    /// The arguments of the backing field, as inlined in `query`.
    pub arguments: Object,
    pub timeout: Option<Duration>,
}

#[buildstructor::buildstructor]
impl BackingRequest {
    #[builder(visibility = "pub")]
    fn new(
        service_name: String,
        operation_name: Option<String>,
        query: String,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        arguments: JsonMap<ByteString, Value>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            service_name,
            operation_name,
            query,
            arguments,
            timeout,
        }
    }
}

pub(crate) const DEFAULT_BUFFER_SIZE: usize = 20_000;

/// The transport used to reach a backing service.
///
/// Transport failures are returned as `Err`; GraphQL errors travel in the
/// response.
pub type BoxBackingService = BoxService<BackingRequest, graphql::Response, BoxError>;

/// A handle on a registered backing service, cheap to clone.
pub type BackingService = BoxCloneService<BackingRequest, graphql::Response, BoxError>;

/// Collection of backing services.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Buffer<BoxBackingService, BackingRequest>>,
}

impl ServiceRegistry {
    /// Register `services` by name.
    ///
    /// Each service is put behind a buffer, so this must be called from
    /// within a Tokio runtime.
    pub fn new(services: HashMap<String, BoxBackingService>) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|(name, service)| (name, Buffer::new(service, DEFAULT_BUFFER_SIZE)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<BackingService> {
        self.services.get(name).map(|s| s.clone().boxed_clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }
}

impl FromIterator<(String, BoxBackingService)> for ServiceRegistry {
    fn from_iter<T: IntoIterator<Item = (String, BoxBackingService)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

//! Hydration errors.
use displaydoc::Display;
use thiserror::Error;

pub use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Object;
use crate::json_ext::Path;

/// Errors raised while talking to a backing service.
///
/// These are recoverable: they never abort a hydration, they are turned into
/// GraphQL errors and travel next to the (partial) data.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// HTTP fetch failed from '{service}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        /// The service failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// request to '{service}' timed out
    SubrequestTimeout {
        /// The service that did not answer in time.
        service: String,
    },

    /// could not find path: {reason}
    ExecutionPathNotFound { reason: String },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut extensions = Object::new();
        extensions.insert("code", self.extension_code().into());
        match self {
            FetchError::SubrequestHttpError { service, .. }
            | FetchError::SubrequestTimeout { service } => {
                extensions.insert("service", service.clone().into());
            }
            FetchError::ExecutionPathNotFound { .. } => {}
        }

        Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestTimeout { .. } => "SUBREQUEST_TIMEOUT",
            FetchError::ExecutionPathNotFound { .. } => "EXECUTION_PATH_NOT_FOUND",
        }
        .to_string()
    }
}

/// Faults raised by a wrongly declared hydration or a backing service that
/// breaks the hydration contract.
///
/// They are fatal for the hydrated field: resolution stops and the fault is
/// reported as a single field error. They are never retried.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum HydrationError {
    /// batch hydration of '{field}' has no field result argument to batch on
    MissingBatchArgument {
        /// The hydrated field coordinates.
        field: String,
    },

    /// batch hydration of '{field}' has {count} field result arguments, exactly one is allowed
    DuplicateBatchArgument {
        /// The hydrated field coordinates.
        field: String,
        /// How many field result arguments were declared.
        count: usize,
    },

    /// type '{type_name}' of service '{service}' does not resolve to any object type
    UnresolvedObjectIdentifierType {
        /// The backing service.
        service: String,
        /// The backing field output type.
        type_name: String,
    },

    /// indexed hydration of '{field}' requires resolved node count ({actual}) == input argument count ({expected})
    IndexedCountMismatch {
        /// The hydrated field coordinates.
        field: String,
        /// How many inputs were sent in the batch.
        expected: usize,
        /// How many values the backing service returned.
        actual: usize,
    },

    /// indexed hydration of '{field}' ran out of resolved values at position {position}
    IndexedResultsExhausted {
        /// The hydrated field coordinates.
        field: String,
        /// The cursor position that could not be read.
        position: usize,
    },

    /// backing field of '{field}' must return a list
    ExpectedListResult {
        /// The hydrated field coordinates.
        field: String,
    },

    /// hydration of '{field}' expects at most one source input per parent, found {count}
    ExpectedSingleSourceId {
        /// The hydrated field coordinates.
        field: String,
        /// How many inputs were found.
        count: usize,
    },

    /// unknown backing service '{service}'
    UnknownService {
        /// The missing service.
        service: String,
    },

    /// could not build the backing query of '{field}': {reason}
    InvalidBackingQuery {
        /// The hydrated field coordinates.
        field: String,
        /// Why the query could not be built.
        reason: String,
    },

    /// parent node at '{path}' has no type discriminator
    MissingTypeDiscriminator {
        /// The parent node path.
        path: Path,
    },
}

impl HydrationError {
    /// Convert the fault to a GraphQL error attached to the hydrated field.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut extensions = Object::new();
        extensions.insert("code", self.extension_code().into());
        if let Some(details) = self.custom_extension_details() {
            extensions.extend(details);
        }

        Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }
}

impl ErrorExtension for HydrationError {
    fn extension_code(&self) -> String {
        match self {
            HydrationError::MissingBatchArgument { .. } => "HYDRATION_MISSING_BATCH_ARGUMENT",
            HydrationError::DuplicateBatchArgument { .. } => "HYDRATION_DUPLICATE_BATCH_ARGUMENT",
            HydrationError::UnresolvedObjectIdentifierType { .. } => {
                "HYDRATION_UNRESOLVED_OBJECT_TYPE"
            }
            HydrationError::IndexedCountMismatch { .. } => "HYDRATION_INDEXED_COUNT_MISMATCH",
            HydrationError::IndexedResultsExhausted { .. } => {
                "HYDRATION_INDEXED_RESULTS_EXHAUSTED"
            }
            HydrationError::ExpectedListResult { .. } => "HYDRATION_EXPECTED_LIST_RESULT",
            HydrationError::ExpectedSingleSourceId { .. } => "HYDRATION_EXPECTED_SINGLE_SOURCE",
            HydrationError::UnknownService { .. } => "HYDRATION_UNKNOWN_SERVICE",
            HydrationError::InvalidBackingQuery { .. } => "HYDRATION_INVALID_BACKING_QUERY",
            HydrationError::MissingTypeDiscriminator { .. } => {
                "HYDRATION_MISSING_TYPE_DISCRIMINATOR"
            }
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            HydrationError::IndexedCountMismatch {
                expected, actual, ..
            } => {
                obj.insert("expected", (*expected as u64).into());
                obj.insert("actual", (*actual as u64).into());
            }
            HydrationError::UnknownService { service }
            | HydrationError::UnresolvedObjectIdentifierType { service, .. } => {
                obj.insert("service", service.clone().into());
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}

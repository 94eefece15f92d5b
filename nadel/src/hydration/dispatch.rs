use std::time::Duration;

use futures::future::join_all;
use tower::ServiceExt;
use tracing::Instrument;

use super::arguments::ArgumentBatch;
use crate::blueprint::BatchHydrationInstruction;
use crate::error::FetchError;
use crate::error::HydrationError;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::query::Field;
use crate::query::Operation;
use crate::services::BackingRequest;
use crate::services::BackingService;

/// One batch and what the backing service answered for it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedObjectBatch {
    pub(crate) source_inputs: Vec<Value>,
    pub(crate) result: graphql::Response,
}

impl ResolvedObjectBatch {
    /// The value of the backing field in the response, if any.
    pub(crate) fn backing_value(&self, instruction: &BatchHydrationInstruction) -> Option<&Value> {
        self.result
            .data
            .as_ref()?
            .get_path(&Path::from_slice(&instruction.query_path_to_backing_field))
    }
}

/// The name of the operations sent for `instruction`.
pub(super) fn operation_name(instruction: &BatchHydrationInstruction) -> String {
    format!(
        "batch_hydration_{}_{}",
        instruction.location.type_name, instruction.location.field_name
    )
}

/// The query sent for one batch: the backing field, nested under its query
/// path, called with `arguments` and selecting `selections`.
pub(super) fn backing_operation(
    instruction: &BatchHydrationInstruction,
    arguments: Object,
    enum_arguments: &[String],
    selections: &[Field],
) -> Operation {
    let mut path = instruction.query_path_to_backing_field.iter().rev();
    let mut field = Field::builder()
        .name(
            path.next()
                .cloned()
                .unwrap_or_else(|| instruction.backing_field_def.name.clone()),
        )
        .arguments(arguments)
        .enum_arguments(enum_arguments.to_vec())
        .children(selections.to_vec())
        .build();
    for name in path {
        field = Field::builder()
            .name(name.clone())
            .children(vec![field])
            .build();
    }
    Operation {
        name: Some(operation_name(instruction)),
        selections: vec![field],
    }
}

fn backing_request(
    instruction: &BatchHydrationInstruction,
    arguments: Object,
    enum_arguments: &[String],
    selections: &[Field],
    timeout: Option<Duration>,
) -> Result<BackingRequest, HydrationError> {
    let operation = backing_operation(instruction, arguments.clone(), enum_arguments, selections);
    let document = operation
        .to_ast()
        .map_err(|error| HydrationError::InvalidBackingQuery {
            field: instruction.location.to_string(),
            reason: error.to_string(),
        })?;
    Ok(BackingRequest::builder()
        .service_name(instruction.backing_service.clone())
        .and_operation_name(operation.name)
        .query(document.serialize().no_indent().to_string())
        .arguments(arguments)
        .and_timeout(timeout)
        .build())
}

/// Call the backing service once per batch, all batches at once.
///
/// Every query is built before any call is made. Results come back in batch
/// order. A failed or timed out call yields a result carrying the error and
/// no data; it never prevents the other batches from completing.
#[tracing::instrument(skip_all, level = "debug", name = "batch_hydration.dispatch", fields(hydration.service = %instruction.backing_service, batches = batches.len()))]
pub(super) async fn dispatch(
    service: BackingService,
    instruction: &BatchHydrationInstruction,
    batches: Vec<ArgumentBatch>,
    enum_arguments: &[String],
    selections: &[Field],
    timeout: Option<Duration>,
) -> Result<Vec<ResolvedObjectBatch>, HydrationError> {
    let requests = batches
        .into_iter()
        .map(|batch| {
            let ArgumentBatch {
                source_inputs,
                arguments,
            } = batch;
            let request =
                backing_request(instruction, arguments, enum_arguments, selections, timeout)?;
            Ok((source_inputs, request))
        })
        .collect::<Result<Vec<_>, HydrationError>>()?;

    let futures = requests
        .into_iter()
        .enumerate()
        .map(|(index, (source_inputs, request))| {
            let service = service.clone();
            async move {
                let result = fetch(service, request, timeout).await;
                ResolvedObjectBatch {
                    source_inputs,
                    result,
                }
            }
            .instrument(tracing::info_span!(
                "batch_hydration.fetch",
                hydration.service = %instruction.backing_service,
                batch = index,
            ))
        });

    Ok(join_all(futures).await)
}

async fn fetch(
    service: BackingService,
    request: BackingRequest,
    timeout: Option<Duration>,
) -> graphql::Response {
    let service_name = request.service_name.clone();
    let call = service.oneshot(request);
    let response = match timeout {
        Some(duration) => match tokio::time::timeout(duration, call).await {
            Ok(response) => response.map_err(|err| FetchError::SubrequestHttpError {
                service: service_name.clone(),
                reason: err.to_string(),
            }),
            Err(_) => Err(FetchError::SubrequestTimeout {
                service: service_name.clone(),
            }),
        },
        None => call.await.map_err(|err| FetchError::SubrequestHttpError {
            service: service_name.clone(),
            reason: err.to_string(),
        }),
    };

    match response {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(service = %service_name, %error, "backing call failed");
            graphql::Response::from_error(error.to_graphql_error(None))
        }
    }
}

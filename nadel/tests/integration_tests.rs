use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use nadel::configuration::Configuration;
use nadel::configuration::HydrationConfiguration;
use nadel::error::HydrationError;
use nadel::graphql;
use nadel::hydration::BatchHydrationTransform;
use nadel::hydration::ExecutionContext;
use nadel::hydration::ParentNode;
use nadel::hydration::Transform;
use nadel::json_ext::Path;
use nadel::json_ext::Value;
use nadel::query::Field;
use nadel::services::BackingRequest;
use nadel::services::BoxBackingService;
use nadel::services::ServiceRegistry;
use nadel::Blueprint;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use tower::service_fn;
use tower::util::BoxService;
use tower::BoxError;

const BLUEPRINT: &str = r#"
services:
  users:
    types:
      User: { kind: object }
      Team: { kind: object }
      Principal: { kind: union, members: [User, Team] }
      UserStatus: { kind: enum }
instructions:
  - location: { type_name: Issue, field_name: authors }
    hydrated_field_type: "[User]"
    backing_service: users
    query_path_to_backing_field: [usersByIds]
    backing_field_def: { name: usersByIds, field_type: "[User]" }
    batch_size: 2
    source_arguments:
      - name: ids
        value_source: { kind: field_result_value, query_path_to_field: [authorIds], field_type: "[ID]" }
    match_strategy: { kind: match_index }
  - location: { type_name: Issue, field_name: watchers }
    hydrated_field_type: "[User]"
    backing_service: users
    query_path_to_backing_field: [usersByIds]
    backing_field_def:
      name: usersByIds
      field_type: "[User]"
      arguments: { ids: "[ID!]!", status: UserStatus }
    batch_size: 3
    source_arguments:
      - name: ids
        value_source: { kind: field_result_value, query_path_to_field: [watcherIds], field_type: "[ID]" }
      - name: includeDeactivated
        value_source: { kind: static_value, value: true }
      - name: status
        value_source: { kind: static_value, value: ACTIVE }
    match_strategy:
      kind: match_object_identifier
      source_id: [watcherIds]
      result_id: id
  - location: { type_name: Issue, field_name: assignees }
    hydrated_field_type: "[Principal]"
    backing_service: users
    query_path_to_backing_field: [principals, byRef]
    backing_field_def: { name: byRef, field_type: "[Principal]" }
    batch_size: 10
    source_arguments:
      - name: refs
        value_source: { kind: field_result_value, query_path_to_field: [assigneeRefs, id], field_type: "ID" }
      - name: first
        value_source: { kind: argument_value, argument_name: first, default_value: 5 }
    match_strategy:
      kind: match_object_identifiers
      identifiers:
        - { source_id: [assigneeRefs, id], result_id: id }
        - { source_id: [assigneeRefs, site], result_id: site }
"#;

type Calls = Arc<Mutex<Vec<BackingRequest>>>;

fn requested_ids(request: &BackingRequest, argument: &str) -> Vec<Value> {
    request
        .arguments
        .get(argument)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// A `users` service answering every id with a user named after it, in the
/// order the ids were requested. Ids listed in `failing` fail their batch.
fn users_service(calls: Calls, failing: &'static [&'static str]) -> BoxBackingService {
    BoxService::new(service_fn(move |request: BackingRequest| {
        let calls = calls.clone();
        async move {
            let ids = requested_ids(&request, "ids");
            calls.lock().unwrap().push(request);
            if ids
                .iter()
                .any(|id| failing.contains(&id.as_str().unwrap_or_default()))
            {
                return Ok::<_, BoxError>(
                    graphql::Response::builder()
                        .error(
                            graphql::Error::builder()
                                .message("users are unavailable")
                                .extension_code("UNAVAILABLE")
                                .build(),
                        )
                        .build(),
                );
            }
            let users: Vec<Value> = ids
                .into_iter()
                .map(|id| {
                    let name = format!("user {}", id.as_str().unwrap_or_default());
                    json!({ "batch_hydration__watchers__id": id, "name": name })
                })
                .collect();
            Ok(graphql::Response::builder()
                .data(json!({ "usersByIds": users }))
                .build())
        }
    }))
}

fn context(services: HashMap<String, BoxBackingService>, configuration: Configuration) -> ExecutionContext {
    let blueprint = Blueprint::from_yaml(BLUEPRINT).unwrap();
    blueprint.validate().unwrap();
    ExecutionContext::builder()
        .blueprint(Arc::new(blueprint))
        .services(ServiceRegistry::new(services))
        .configuration(Arc::new(configuration))
        .service_name("issues")
        .build()
}

fn users(calls: &Calls, failing: &'static [&'static str]) -> HashMap<String, BoxBackingService> {
    [("users".to_string(), users_service(calls.clone(), failing))]
        .into_iter()
        .collect()
}

fn hydrated_field(name: &str) -> Field {
    Field::builder()
        .name(name)
        .object_types(vec!["Issue".to_string()])
        .children(vec![Field::builder().name("name").build()])
        .build()
}

/// Run the transform for `field` over the parents found at `parents_at`, and
/// apply what it produced to a copy of `data`.
async fn hydrate(
    context: &ExecutionContext,
    field: &Field,
    data: &Value,
    parents_at: &str,
) -> Result<(Value, Vec<graphql::Error>), HydrationError> {
    let transform = BatchHydrationTransform::default();
    let state = transform
        .is_applicable(context, field)
        .expect("field must be hydrated");
    let parents = ParentNode::select(data, &Path::from(parents_at));
    let result = transform
        .get_result_instructions(context, &state, &parents)
        .await?;
    let mut hydrated = data.clone();
    let errors = result.apply(&mut hydrated).expect("instructions must apply");
    Ok((hydrated, errors))
}

#[test_log::test(tokio::test)]
async fn index_matching_fans_out_per_parent() {
    let calls = Calls::default();
    let context = context(users(&calls, &[]), Configuration::default());
    let data = json!({"issues": [
        {"key": "A-1", "batch_hydration__authors__authorIds": ["1"]},
        {"key": "A-2", "batch_hydration__authors__authorIds": ["1", "2"]},
    ]});

    let (hydrated, errors) = hydrate(&context, &hydrated_field("authors"), &data, "issues")
        .await
        .unwrap();

    assert!(errors.is_empty());
    assert_eq!(
        hydrated["issues"][0]["authors"],
        json!([{"batch_hydration__watchers__id": "1", "name": "user 1"}])
    );
    assert_eq!(
        hydrated["issues"][1]["authors"],
        json!([
            {"batch_hydration__watchers__id": "1", "name": "user 1"},
            {"batch_hydration__watchers__id": "2", "name": "user 2"},
        ])
    );

    let calls = calls.lock().unwrap();
    let mut batches: Vec<Vec<Value>> = calls
        .iter()
        .map(|call| requested_ids(call, "ids"))
        .collect();
    batches.sort_by_key(|ids| ids.len());
    assert_eq!(batches, vec![vec![json!("2")], vec![json!("1"), json!("1")]]);
}

#[tokio::test]
async fn the_query_selects_what_the_client_asked_for() {
    let calls = Calls::default();
    let context = context(users(&calls, &[]), Configuration::default());
    let data = json!({"issues": [{"batch_hydration__watchers__watcherIds": ["7"]}]});

    hydrate(&context, &hydrated_field("watchers"), &data, "issues")
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].service_name, "users");
    assert_eq!(
        calls[0].operation_name.as_deref(),
        Some("batch_hydration_Issue_watchers")
    );
    assert_eq!(
        calls[0].query,
        r#"query batch_hydration_Issue_watchers { usersByIds(ids: ["7"], includeDeactivated: true, status: ACTIVE) { batch_hydration__watchers__id: id name } }"#
    );
}

#[tokio::test]
async fn identifier_matching_follows_source_order() {
    let service = BoxService::new(service_fn(|_: BackingRequest| async {
        Ok::<_, BoxError>(
            graphql::Response::builder()
                .data(json!({"usersByIds": [
                    {"batch_hydration__watchers__id": "user-20", "name": "Newmarket"},
                    {"batch_hydration__watchers__id": "user-100", "name": "Spaces"},
                ]}))
                .build(),
        )
    }));
    let context = context(
        [("users".to_string(), service)].into_iter().collect(),
        Configuration::default(),
    );
    let data = json!({"issues": [
        {"batch_hydration__watchers__watcherIds": ["user-100", "user-20"]},
        {"batch_hydration__watchers__watcherIds": ["user-20", "user-404", null]},
        {"batch_hydration__watchers__watcherIds": [null]},
        {"batch_hydration__watchers__watcherIds": []},
        {"batch_hydration__watchers__watcherIds": null},
    ]});

    let (hydrated, errors) = hydrate(&context, &hydrated_field("watchers"), &data, "issues")
        .await
        .unwrap();

    assert!(errors.is_empty());
    let watchers: Vec<&Value> = (0..5)
        .map(|index| &hydrated["issues"][index]["watchers"])
        .collect();
    assert_eq!(
        watchers,
        vec![
            &json!([{"name": "Spaces"}, {"name": "Newmarket"}]),
            &json!([{"name": "Newmarket"}, null, null]),
            &Value::Null,
            &Value::Null,
            &Value::Null,
        ]
    );
}

#[test_log::test(tokio::test)]
async fn failed_batches_do_not_affect_others() {
    let calls = Calls::default();
    let context = context(users(&calls, &["3"]), Configuration::default());
    let data = json!({"issues": [
        {"batch_hydration__authors__authorIds": ["1", "2"]},
        {"batch_hydration__authors__authorIds": ["3"]},
    ]});

    let (hydrated, errors) = hydrate(&context, &hydrated_field("authors"), &data, "issues")
        .await
        .unwrap();

    assert_eq!(
        hydrated["issues"][0]["authors"],
        json!([
            {"batch_hydration__watchers__id": "1", "name": "user 1"},
            {"batch_hydration__watchers__id": "2", "name": "user 2"},
        ])
    );
    assert_eq!(hydrated["issues"][1]["authors"], json!([null]));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "users are unavailable");
    assert_eq!(errors[0].path, Some(Path::from("issues/authors")));
    assert_eq!(errors[0].extension_code().as_deref(), Some("UNAVAILABLE"));
}

#[tokio::test]
async fn short_batches_are_a_contract_violation() {
    let service = BoxService::new(service_fn(|_: BackingRequest| async {
        Ok::<_, BoxError>(
            graphql::Response::builder()
                .data(json!({"usersByIds": [{"name": "only one"}]}))
                .build(),
        )
    }));
    let context = context(
        [("users".to_string(), service)].into_iter().collect(),
        Configuration::default(),
    );
    let data = json!({"issues": [
        {"batch_hydration__authors__authorIds": ["1", "2", "3"]},
    ]});

    let error = hydrate(&context, &hydrated_field("authors"), &data, "issues")
        .await
        .unwrap_err();
    assert_eq!(
        error,
        HydrationError::IndexedCountMismatch {
            field: "Issue.authors".to_string(),
            expected: 2,
            actual: 1,
        }
    );
    let error = error.to_graphql_error(Some(Path::from("issues/0/authors")));
    assert_eq!(
        error.extension_code().as_deref(),
        Some("HYDRATION_INDEXED_COUNT_MISMATCH")
    );
}

#[tokio::test]
async fn composite_identifiers() {
    let calls = Calls::default();
    let recorded = calls.clone();
    let service = BoxService::new(service_fn(move |request: BackingRequest| {
        let calls = recorded.clone();
        async move {
            calls.lock().unwrap().push(request);
            Ok::<_, BoxError>(
                graphql::Response::builder()
                    .data(json!({"principals": {"byRef": [
                        {
                            "batch_hydration__assignees__id": "1",
                            "batch_hydration__assignees__site": "east",
                            "name": "east one"
                        },
                        {
                            "batch_hydration__assignees__id": "1",
                            "batch_hydration__assignees__site": "west",
                            "name": "west one"
                        },
                    ]}}))
                    .build(),
            )
        }
    }));
    let context = context(
        [("users".to_string(), service)].into_iter().collect(),
        Configuration::default(),
    );
    let field = Field::builder()
        .name("assignees")
        .argument("first", json!(2))
        .object_types(vec!["Issue".to_string()])
        .children(vec![
            Field::builder()
                .name("name")
                .object_types(vec!["User".to_string(), "Team".to_string()])
                .build(),
        ])
        .build();
    let data = json!({"issues": [
        {"batch_hydration__assignees__assigneeRefs": [
            {"id": "1", "site": "west"},
            {"id": "1", "site": "north"},
            {"id": "1", "site": "east"},
        ]},
        {"batch_hydration__assignees__assigneeRefs": [{"id": null, "site": null}]},
    ]});

    let (hydrated, errors) = hydrate(&context, &field, &data, "issues").await.unwrap();

    assert!(errors.is_empty());
    assert_eq!(
        hydrated["issues"][0]["assignees"],
        json!([{"name": "west one"}, null, {"name": "east one"}])
    );
    assert_eq!(hydrated["issues"][1]["assignees"], Value::Null);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].query,
        r#"query batch_hydration_Issue_assignees { principals { byRef(refs: ["1", "1", "1"], first: 2) { ... on User { batch_hydration__assignees__id: id batch_hydration__assignees__site: site name } ... on Team { batch_hydration__assignees__id: id batch_hydration__assignees__site: site name } } } }"#
    );
}

#[tokio::test]
async fn argument_defaults_apply_when_the_client_omits_them() {
    let calls = Calls::default();
    let recorded = calls.clone();
    let service = BoxService::new(service_fn(move |request: BackingRequest| {
        let calls = recorded.clone();
        async move {
            calls.lock().unwrap().push(request);
            Ok::<_, BoxError>(graphql::Response::builder().build())
        }
    }));
    let context = context(
        [("users".to_string(), service)].into_iter().collect(),
        Configuration::default(),
    );
    let data = json!({"issues": [
        {"batch_hydration__assignees__assigneeRefs": [{"id": "9", "site": "east"}]},
    ]});

    let (hydrated, _) = hydrate(&context, &hydrated_field("assignees"), &data, "issues")
        .await
        .unwrap();

    assert_eq!(hydrated["issues"][0]["assignees"], json!([null]));
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].arguments.get("first"), Some(&json!(5)));
}

#[test_log::test(tokio::test)]
async fn slow_backing_calls_time_out() {
    let service = BoxService::new(service_fn(|_: BackingRequest| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, BoxError>(graphql::Response::builder().build())
    }));
    let configuration = Configuration::builder()
        .hydration(
            HydrationConfiguration::builder()
                .timeout(Duration::from_millis(20))
                .build(),
        )
        .build();
    let context = context(
        [("users".to_string(), service)].into_iter().collect(),
        configuration,
    );
    let data = json!({"issues": [{"batch_hydration__authors__authorIds": ["1", "2"]}]});

    let (hydrated, errors) = hydrate(&context, &hydrated_field("authors"), &data, "issues")
        .await
        .unwrap();

    assert_eq!(hydrated["issues"][0]["authors"], json!([null, null]));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].extension_code().as_deref(), Some("SUBREQUEST_TIMEOUT"));
}

#[tokio::test]
async fn configured_batch_size_caps_declared_size() {
    let calls = Calls::default();
    let configuration = Configuration::builder()
        .hydration(HydrationConfiguration::builder().max_batch_size(1).build())
        .build();
    let context = context(users(&calls, &[]), configuration);
    let data = json!({"issues": [
        {"batch_hydration__watchers__watcherIds": ["1", "2", "3"]},
    ]});

    let (hydrated, _) = hydrate(&context, &hydrated_field("watchers"), &data, "issues")
        .await
        .unwrap();

    assert_eq!(
        hydrated["issues"][0]["watchers"],
        json!([{"name": "user 1"}, {"name": "user 2"}, {"name": "user 3"}])
    );
    assert_eq!(calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn nothing_is_sent_without_inputs() {
    let calls = Calls::default();
    let context = context(users(&calls, &[]), Configuration::default());
    let data = json!({"issues": [
        {"batch_hydration__authors__authorIds": null},
        {"key": "A-3"},
    ]});

    let (hydrated, errors) = hydrate(&context, &hydrated_field("authors"), &data, "issues")
        .await
        .unwrap();

    assert!(errors.is_empty());
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(hydrated["issues"][0]["authors"], Value::Null);
    assert_eq!(hydrated["issues"][1]["authors"], Value::Null);
}

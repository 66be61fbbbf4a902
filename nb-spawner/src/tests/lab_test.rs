use std::sync::Arc;
use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

use futures::StreamExt;
use httpmock::Method::*;
use nb_core::config::Config;
use nb_prepuller::Prepuller;
use rstest::*;
use serde_json::json;

use super::*;
use crate::errors::SpawnerError;
use crate::events::EventBroker;

const USER_NS: &str = "nublado-ribbon";

fn build_manager(client: kube::Client, config: Config) -> (LabManager, UserMap, EventBroker) {
    let config = Arc::new(config);
    let user_map = UserMap::new();
    let events = EventBroker::new(user_map.clone());
    let prepuller = Arc::new(Prepuller::new(client.clone(), config.prepuller.config.clone()));
    let manager = LabManager::new(client, config, user_map.clone(), events.clone(), prepuller);
    (manager, user_map, events)
}

fn namespace_body() -> serde_json::Value {
    json!({"kind": "Namespace", "apiVersion": "v1", "metadata": {"name": USER_NS}})
}

// The full happy path: namespace, supporting objects, pod; the record ends
// up running with a pod present and the event stream ends with `complete`.
#[rstest]
#[tokio::test]
async fn test_create_lab(
    test_user: UserInfo,
    test_lab_spec: LabSpecification,
    test_config: Config,
) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    let nodes = vec![cluster_node(TEST_NODE_1, vec![container_image(
        &[&digest_ref(TEST_DIGEST), &tagged_ref("recommended")],
        1 << 30,
    )])];
    let node_body = list_body("NodeList", &nodes);
    fake_apiserver.handle(move |when, then| {
        when.method(GET).path("/api/v1/nodes");
        then.json_body(node_body.clone());
    });
    fake_apiserver.handle(|when, then| {
        when.method(POST).path("/api/v1/namespaces");
        then.json_body(namespace_body());
    });
    fake_apiserver.handle(|when, then| {
        when.method(GET)
            .path(format!("/api/v1/namespaces/{TEST_CTRL_NAMESPACE}/secrets/controller-secret"));
        then.json_body(json!({
            "kind": "Secret",
            "apiVersion": "v1",
            "metadata": {"name": "controller-secret"},
            "data": {"butler-secret": "aHVudGVyMg=="},
        }));
    });
    fake_apiserver.handle(|when, then| {
        when.method(POST).path(format!("/api/v1/namespaces/{USER_NS}/secrets"));
        then.json_body(json!({
            "kind": "Secret",
            "apiVersion": "v1",
            "metadata": {"name": "nb-ribbon", "namespace": USER_NS},
        }));
    });
    fake_apiserver.handle_multiple(
        |when, then| {
            when.method(POST).path(format!("/api/v1/namespaces/{USER_NS}/configmaps"));
            then.json_body(json!({
                "kind": "ConfigMap",
                "apiVersion": "v1",
                "metadata": {"name": "nb-ribbon-cm", "namespace": USER_NS},
            }));
        },
        2,
    );
    fake_apiserver.handle(|when, then| {
        when.method(POST)
            .path(format!("/apis/networking.k8s.io/v1/namespaces/{USER_NS}/networkpolicies"));
        then.json_body(json!({
            "kind": "NetworkPolicy",
            "apiVersion": "networking.k8s.io/v1",
            "metadata": {"name": "nb-ribbon", "namespace": USER_NS},
            "spec": {"podSelector": {}},
        }));
    });
    fake_apiserver.handle(|when, then| {
        when.method(POST).path(format!("/api/v1/namespaces/{USER_NS}/resourcequotas"));
        then.json_body(json!({
            "kind": "ResourceQuota",
            "apiVersion": "v1",
            "metadata": {"name": "nb-ribbon", "namespace": USER_NS},
        }));
    });
    fake_apiserver.handle(|when, then| {
        when.method(POST).path(format!("/api/v1/namespaces/{USER_NS}/pods"));
        then.json_body(json!({
            "kind": "Pod",
            "apiVersion": "v1",
            "metadata": {"name": "nb-ribbon", "namespace": USER_NS},
        }));
    });

    let (manager, user_map, events) = build_manager(client, test_config);
    manager.create(&test_user, &test_lab_spec, TEST_TOKEN).await.unwrap();

    let data = user_map.get(TEST_USER).unwrap();
    assert_eq!(data.status, LabStatus::Running);
    assert_eq!(data.pod, PodState::Present);

    let streamed: Vec<Event> = events.publish(TEST_USER).collect().await;
    assert_eq!(streamed.last().unwrap().event, EventType::Complete);
    fake_apiserver.assert();
}

// A second create while the record exists fails fast, before any cluster
// call is issued.
#[rstest]
#[tokio::test]
async fn test_create_lab_duplicate(
    test_user: UserInfo,
    test_lab_spec: LabSpecification,
    test_config: Config,
) {
    let (fake_apiserver, client) = make_fake_apiserver();
    let (manager, user_map, _) = build_manager(client, test_config);

    user_map.create_if_absent(&test_user, &test_lab_spec, &test_resources()).unwrap();

    let err = manager
        .create(&test_user, &test_lab_spec, TEST_TOKEN)
        .await
        .unwrap_err()
        .downcast::<SpawnerError>()
        .unwrap();
    assert!(matches!(err, SpawnerError::AlreadyExists(_)));
    fake_apiserver.assert();
}

#[rstest]
#[tokio::test]
async fn test_create_lab_unknown_size(
    test_user: UserInfo,
    mut test_lab_spec: LabSpecification,
    test_config: Config,
) {
    let (fake_apiserver, client) = make_fake_apiserver();
    let (manager, user_map, _) = build_manager(client, test_config);

    test_lab_spec.options.size = LabSize::Colossal;
    let err = manager
        .create(&test_user, &test_lab_spec, TEST_TOKEN)
        .await
        .unwrap_err()
        .downcast::<SpawnerError>()
        .unwrap();
    assert!(matches!(err, SpawnerError::UnknownSize(_)));
    // No record is left behind for a request that never started
    assert!(user_map.get(TEST_USER).is_none());
    fake_apiserver.assert();
}

// Namespace creation hits a conflict three times (each one deleting the
// stranded namespace) and then goes through.
#[rstest]
#[tokio::test]
async fn test_namespace_collision_retries(
    test_user: UserInfo,
    test_lab_spec: LabSpecification,
    test_config: Config,
) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    let conflicts = Arc::new(AtomicUsize::new(0));
    let counter = conflicts.clone();
    fake_apiserver.handle_multiple(
        move |when, then| {
            let counter = counter.clone();
            when.matches(move |req| {
                req.method().to_string() == "POST"
                    && req.uri().path() == "/api/v1/namespaces"
                    && counter.fetch_add(1, Ordering::SeqCst) < 3
            });
            then.status(409).json_body(status_conflict());
        },
        3,
    );
    fake_apiserver.handle_multiple(
        |when, then| {
            when.method(DELETE).path(format!("/api/v1/namespaces/{USER_NS}"));
            then.json_body(status_ok());
        },
        3,
    );
    let after = conflicts.clone();
    fake_apiserver.handle(move |when, then| {
        let after = after.clone();
        when.matches(move |req| {
            req.method().to_string() == "POST"
                && req.uri().path() == "/api/v1/namespaces"
                && after.load(Ordering::SeqCst) >= 3
        });
        then.json_body(namespace_body());
    });

    let (manager, user_map, _) = build_manager(client, test_config);
    user_map.create_if_absent(&test_user, &test_lab_spec, &test_resources()).unwrap();

    manager.create_user_namespace(TEST_USER, 0).await.unwrap();
    fake_apiserver.assert();
}

// Six conflicts in a row exhausts the retry limit.
#[rstest]
#[tokio::test]
async fn test_namespace_collision_gives_up(
    test_user: UserInfo,
    test_lab_spec: LabSpecification,
    test_config: Config,
) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    fake_apiserver.handle_multiple(
        |when, then| {
            when.method(POST).path("/api/v1/namespaces");
            then.status(409).json_body(status_conflict());
        },
        6,
    );
    fake_apiserver.handle_multiple(
        |when, then| {
            when.method(DELETE).path(format!("/api/v1/namespaces/{USER_NS}"));
            then.json_body(status_ok());
        },
        5,
    );

    let (manager, user_map, _) = build_manager(client, test_config);
    user_map.create_if_absent(&test_user, &test_lab_spec, &test_resources()).unwrap();

    let err = manager
        .create_user_namespace(TEST_USER, 0)
        .await
        .unwrap_err()
        .downcast::<SpawnerError>()
        .unwrap();
    assert!(matches!(err, SpawnerError::NamespaceCollision(_)));
    fake_apiserver.assert();
}

#[rstest]
#[tokio::test]
async fn test_delete_lab(test_user: UserInfo, test_lab_spec: LabSpecification, test_config: Config) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver.handle(|when, then| {
        when.method(DELETE).path(format!("/api/v1/namespaces/{USER_NS}"));
        then.json_body(status_ok());
    });

    let (manager, user_map, _) = build_manager(client, test_config);
    user_map.create_if_absent(&test_user, &test_lab_spec, &test_resources()).unwrap();

    manager.delete(TEST_USER).await.unwrap();
    assert!(user_map.get(TEST_USER).is_none());
    fake_apiserver.assert();
}

// Deleting an absent user's lab is NotFound with no side effects.
#[rstest]
#[tokio::test]
async fn test_delete_lab_absent_user(test_config: Config) {
    let (fake_apiserver, client) = make_fake_apiserver();
    let (manager, _, _) = build_manager(client, test_config);

    let err = manager.delete(TEST_USER).await.unwrap_err().downcast::<SpawnerError>().unwrap();
    assert!(matches!(err, SpawnerError::NotFound(_)));
    fake_apiserver.assert();
}

#[rstest]
#[tokio::test]
async fn test_delete_lab_failure_marks_record(
    test_user: UserInfo,
    test_lab_spec: LabSpecification,
    test_config: Config,
) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver.handle(|when, then| {
        when.method(DELETE).path(format!("/api/v1/namespaces/{USER_NS}"));
        then.status(500);
    });

    let (manager, user_map, _) = build_manager(client, test_config);
    user_map.create_if_absent(&test_user, &test_lab_spec, &test_resources()).unwrap();

    assert!(manager.delete(TEST_USER).await.is_err());
    let data = user_map.get(TEST_USER).unwrap();
    assert_eq!(data.status, LabStatus::Failed);
    fake_apiserver.assert();
}

// An image the cluster has never seen is refused, and the record is left
// behind marked failed with a terminal failed event.
#[rstest]
#[tokio::test]
async fn test_create_lab_unknown_image(
    test_user: UserInfo,
    mut test_lab_spec: LabSpecification,
    test_config: Config,
) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    let nodes = vec![cluster_node(TEST_NODE_1, vec![container_image(
        &[&digest_ref(TEST_DIGEST), &tagged_ref("recommended")],
        1 << 30,
    )])];
    let node_body = list_body("NodeList", &nodes);
    fake_apiserver.handle(move |when, then| {
        when.method(GET).path("/api/v1/nodes");
        then.json_body(node_body.clone());
    });

    test_lab_spec.options.image = tagged_ref("w_1999_01");
    let (manager, user_map, events) = build_manager(client, test_config);

    let err = manager
        .create(&test_user, &test_lab_spec, TEST_TOKEN)
        .await
        .unwrap_err()
        .downcast::<SpawnerError>()
        .unwrap();
    assert!(matches!(err, SpawnerError::UnknownImage(_)));

    assert_eq!(user_map.get(TEST_USER).unwrap().status, LabStatus::Failed);
    let streamed: Vec<Event> = events.publish(TEST_USER).collect().await;
    assert_eq!(streamed.last().unwrap().event, EventType::Failed);
    fake_apiserver.assert();
}

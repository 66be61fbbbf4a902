use httpmock::Method::*;
use rstest::*;

use super::*;

fn nodes_response(nodes: &[corev1::Node]) -> serde_json::Value {
    list_body("NodeList", nodes)
}

// Scenario: a single recommended image present on node1 only.  One pull pod
// gets created, pinned to node2; the next snapshot (all nodes tagged) shows
// the image prepulled and spawns nothing.
#[rstest]
#[tokio::test]
async fn test_prepull_spawns_pod_for_missing_node(test_settings: PrepullerSettings) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    let entry = container_image(&[&digest_ref(TEST_DIGEST), &tagged_ref("recommended")], 1 << 30);
    let nodes = vec![cluster_node(TEST_NODE_1, vec![entry]), cluster_node(TEST_NODE_2, vec![])];
    let node_body = nodes_response(&nodes);
    fake_apiserver.handle(move |when, then| {
        when.method(GET).path("/api/v1/nodes");
        then.json_body(node_body.clone());
    });

    // Exactly one pod creation
    fake_apiserver.handle(|when, then| {
        when.method(POST).path(format!("/api/v1/namespaces/{TEST_CTRL_NAMESPACE}/pods"));
        then.json_body(serde_json::json!({
            "kind": "Pod",
            "apiVersion": "v1",
            "metadata": {"name": "prepull-recommended-node2"},
        }));
    });

    let prepuller = Prepuller::new(client, test_settings);
    prepuller.prepull_images().await.unwrap();
    fake_apiserver.assert();
}

#[rstest]
#[tokio::test]
async fn test_prepull_noop_when_everything_prepulled(test_settings: PrepullerSettings) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    let entry = || container_image(&[&digest_ref(TEST_DIGEST), &tagged_ref("recommended")], 1 << 30);
    let nodes = vec![cluster_node(TEST_NODE_1, vec![entry()]), cluster_node(TEST_NODE_2, vec![entry()])];
    let node_body = nodes_response(&nodes);
    fake_apiserver.handle_multiple(
        move |when, then| {
            when.method(GET).path("/api/v1/nodes");
            then.json_body(node_body.clone());
        },
        2,
    );

    let prepuller = Prepuller::new(client, test_settings);

    let status = prepuller.get_prepulls().await.unwrap();
    assert!(status.images.pending.is_empty());
    assert_eq!(status.images.prepulled.len(), 1);

    // No pod handler is registered, so any creation attempt would show up
    // as an unexpected-request failure in the campaign close
    prepuller.prepull_images().await.unwrap();
    fake_apiserver.assert();
}

#[rstest]
#[tokio::test]
async fn test_prepull_status_reports_missing_nodes(test_settings: PrepullerSettings) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    let entry = container_image(&[&digest_ref(TEST_DIGEST), &tagged_ref("w_2023_14")], 1 << 30);
    let nodes = vec![cluster_node(TEST_NODE_1, vec![entry]), cluster_node(TEST_NODE_2, vec![])];
    let node_body = nodes_response(&nodes);
    fake_apiserver.handle(move |when, then| {
        when.method(GET).path("/api/v1/nodes");
        then.json_body(node_body.clone());
    });

    let prepuller = Prepuller::new(client, test_settings);
    let status = prepuller.get_prepulls().await.unwrap();

    assert_eq!(status.images.pending.len(), 1);
    let pending = &status.images.pending[0];
    assert_eq!(pending.nodes.len(), 1);
    assert_eq!(pending.nodes[0].name, TEST_NODE_1);
    assert_eq!(pending.missing.len(), 1);
    assert_eq!(pending.missing[0].name, TEST_NODE_2);
    fake_apiserver.assert();
}

#[rstest]
fn test_pull_pod_is_pinned_and_trivial() {
    let pod = crate::reconciler::build_pull_pod(&tagged_ref("w_2023_14"), TEST_NODE_2, TEST_CTRL_NAMESPACE);

    assert_eq!(pod.metadata.name.as_deref(), Some("prepull-w-2023-14-node2"));
    assert_eq!(pod.metadata.namespace.as_deref(), Some(TEST_CTRL_NAMESPACE));
    let spec = pod.spec.unwrap();
    assert_eq!(spec.node_name.as_deref(), Some(TEST_NODE_2));
    let container = &spec.containers[0];
    assert_eq!(container.image.as_deref(), Some(tagged_ref("w_2023_14").as_str()));
    assert_eq!(container.command, Some(vec!["/bin/sleep".to_string(), "5".to_string()]));
}

#[rstest]
#[tokio::test]
async fn test_image_exists_checks_all_tags(test_settings: PrepullerSettings) {
    let (mut fake_apiserver, client) = make_fake_apiserver();

    let entry = container_image(
        &[&digest_ref(TEST_DIGEST), &tagged_ref("recommended"), &tagged_ref("w_2023_14")],
        1 << 30,
    );
    let nodes = vec![cluster_node(TEST_NODE_1, vec![entry])];
    let node_body = nodes_response(&nodes);
    fake_apiserver.handle_multiple(
        move |when, then| {
            when.method(GET).path("/api/v1/nodes");
            then.json_body(node_body.clone());
        },
        3,
    );

    let prepuller = Prepuller::new(client, test_settings);
    assert!(prepuller.image_exists(&tagged_ref("recommended")).await.unwrap());
    assert!(prepuller.image_exists(&tagged_ref("w_2023_14")).await.unwrap());
    assert!(!prepuller.image_exists(&tagged_ref("w_1999_01")).await.unwrap());
    fake_apiserver.assert();
}

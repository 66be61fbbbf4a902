//! The lab lifecycle manager: staged creation and teardown of per-user
//! environments, with partial-failure recovery and a progress event stream.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use base64::prelude::*;
use k8s_openapi::ByteString;
use kube::core::ErrorResponse;
use nb_api::v1::{
    Event,
    LabSize,
    LabSpecification,
    LabStatus,
    PodState,
    ResourceQuantum,
    UserInfo,
    UserResources,
};
use nb_core::config::Config;
use nb_core::errors::*;
use nb_core::k8s::{
    controller_namespace,
    user_namespace,
};
use nb_core::prelude::*;
use nb_core::tasks::TaskGroup;
use nb_prepuller::Prepuller;
use tracing::*;

use crate::errors::SpawnerError;
use crate::events::EventBroker;
use crate::objects::*;
use crate::user_map::UserMap;

const NS_MAX_RETRIES: u32 = 5;

// Initial requests are this fraction of the size's limits
const REQUEST_FRACTION: f64 = 0.25;

#[derive(Clone)]
pub struct LabManager {
    client: kube::Client,
    config: Arc<Config>,
    user_map: UserMap,
    events: EventBroker,
    prepuller: Arc<Prepuller>,
}

impl LabManager {
    pub fn new(
        client: kube::Client,
        config: Arc<Config>,
        user_map: UserMap,
        events: EventBroker,
        prepuller: Arc<Prepuller>,
    ) -> LabManager {
        LabManager { client, config, user_map, events, prepuller }
    }

    /// Create the user's whole lab environment: namespace, supporting
    /// objects, and pod, emitting progress events throughout.  On failure
    /// the record is left behind, marked failed, for the user to observe
    /// and then delete.
    pub async fn create(&self, user: &UserInfo, spec: &LabSpecification, token: &str) -> EmptyResult {
        let username = &user.username;
        debug!("received creation request for {username}");

        let resources = self.resources_for(spec.options.size)?;
        self.user_map.create_if_absent(user, spec, &resources)?;

        match self.create_lab_environment(user, spec, token, &resources).await {
            Ok(()) => {
                self.user_map.set_status(username, LabStatus::Running);
                self.user_map.set_pod_state(username, PodState::Present);
                self.events.append(username, Event::progress(100));
                self.events.append(username, Event::complete());
                info!("lab created for {username}");
                Ok(())
            },
            Err(e) => {
                error!("lab creation for {username} failed: {e:#}");
                self.user_map.set_status(username, LabStatus::Failed);
                self.events.append(username, Event::error(&format!("{e}")));
                self.events.append(username, Event::failed("lab creation failed"));
                Err(e)
            },
        }
    }

    async fn create_lab_environment(
        &self,
        user: &UserInfo,
        spec: &LabSpecification,
        token: &str,
        resources: &UserResources,
    ) -> EmptyResult {
        let username = &user.username;
        self.events.append(username, Event::info(&format!("Lab creation initiated for {username}")));

        if !self.prepuller.image_exists(&spec.options.image).await? {
            bail!(SpawnerError::unknown_image(&spec.options.image));
        }

        self.create_user_namespace(username, 0).await?;
        self.events.append(username, Event::progress(25));
        self.events.append(username, Event::info("Namespace created"));

        self.create_user_lab_objects(user, spec, token, resources).await?;
        self.events.append(username, Event::progress(50));
        self.events.append(username, Event::info("Lab resources created"));

        self.create_user_pod(user, spec, resources).await?;
        self.events.append(username, Event::progress(75));
        self.events.append(username, Event::info("Lab pod submitted"));

        Ok(())
    }

    // A conflicting namespace is a stranded one: we know the user has no
    // lab record, so whatever is in there is left over from a previous
    // life.  Deleting the namespace cleans out all of its contents.
    #[async_recursion]
    pub(crate) async fn create_user_namespace(&self, username: &str, retries: u32) -> EmptyResult {
        let ns_api = kube::Api::<corev1::Namespace>::all(self.client.clone());
        let ns_name = user_namespace(username);

        match ns_api.create(&Default::default(), &build_namespace(username)).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => {
                info!("namespace {ns_name} already exists; deleting and retrying");
                if retries >= NS_MAX_RETRIES {
                    bail!(SpawnerError::namespace_collision(username));
                }
                ns_api.delete(&ns_name, &Default::default()).await?;
                self.create_user_namespace(username, retries + 1).await
            },
            Err(e) => Err(e.into()),
        }
    }

    // Create the supporting objects in parallel under one task group
    // bounded by the cluster request timeout; the first failure aborts
    // the rest.
    async fn create_user_lab_objects(
        &self,
        user: &UserInfo,
        spec: &LabSpecification,
        token: &str,
        resources: &UserResources,
    ) -> EmptyResult {
        let username = &user.username;
        let ns_name = user_namespace(username);
        let mut group = TaskGroup::new(Duration::from_secs(self.config.kubernetes.request_timeout));

        let secret_data = self.merge_controller_secrets(token).await?;
        let secrets_api = kube::Api::<corev1::Secret>::namespaced(self.client.clone(), &ns_name);
        let secret = build_user_secret(username, secret_data);
        group.spawn(async move {
            secrets_api.create(&Default::default(), &secret).await?;
            Ok(())
        });

        let cm_api = kube::Api::<corev1::ConfigMap>::namespaced(self.client.clone(), &ns_name);
        let nss = build_nss_configmap(username, &self.config.lab.files);
        group.spawn({
            let cm_api = cm_api.clone();
            async move {
                cm_api.create(&Default::default(), &nss).await?;
                Ok(())
            }
        });

        let env = build_env_configmap(username, spec, &self.config);
        group.spawn(async move {
            cm_api.create(&Default::default(), &env).await?;
            Ok(())
        });

        let netpol_api = kube::Api::<networkingv1::NetworkPolicy>::namespaced(self.client.clone(), &ns_name);
        let netpol = build_network_policy(username);
        group.spawn(async move {
            netpol_api.create(&Default::default(), &netpol).await?;
            Ok(())
        });

        let quota_api = kube::Api::<corev1::ResourceQuota>::namespaced(self.client.clone(), &ns_name);
        let quantum = spec.namespace_quota.unwrap_or(resources.limits);
        let quota = build_resource_quota(username, &quantum);
        group.spawn(async move {
            quota_api.create(&Default::default(), &quota).await?;
            Ok(())
        });

        group.close().await
    }

    /// Merge the configured controller secrets with the caller's token.
    /// Duplicate configured keys were rejected at boot; the reserved
    /// `token` key is filled here and nowhere else.
    async fn merge_controller_secrets(&self, token: &str) -> anyhow::Result<BTreeMap<String, ByteString>> {
        let source_ns = controller_namespace();
        let secrets_api = kube::Api::<corev1::Secret>::namespaced(self.client.clone(), &source_ns);

        let mut data: BTreeMap<String, ByteString> = BTreeMap::new();
        for secret_ref in &self.config.lab.secrets {
            let source = secrets_api.get(&secret_ref.secret_ref).await?;
            // The source values go right back into a secret, so there's no
            // point in decoding them
            let value = source
                .data
                .as_ref()
                .and_then(|d| d.get(&secret_ref.secret_key))
                .ok_or_else(|| {
                    anyhow!("key {} not found in secret {}", secret_ref.secret_key, secret_ref.secret_ref)
                })?;
            data.insert(secret_ref.secret_key.clone(), value.clone());
        }

        data.insert(
            USER_TOKEN_SECRET_KEY.into(),
            ByteString(BASE64_STANDARD.encode(token).into_bytes()),
        );
        Ok(data)
    }

    async fn create_user_pod(
        &self,
        user: &UserInfo,
        spec: &LabSpecification,
        resources: &UserResources,
    ) -> EmptyResult {
        let ns_name = user_namespace(&user.username);
        let pods_api = kube::Api::<corev1::Pod>::namespaced(self.client.clone(), &ns_name);
        let pod = build_lab_pod(user, spec, resources, &self.config);
        debug!("new lab pod spec: {pod:?}");
        pods_api.create(&Default::default(), &pod).await?;
        Ok(())
    }

    /// Tear the user's lab down.  Deleting the namespace cascades to every
    /// contained resource; the record only goes away once that succeeds.
    pub async fn delete(&self, username: &str) -> EmptyResult {
        if self.user_map.get(username).is_none() {
            bail!(SpawnerError::not_found(username));
        }
        self.user_map.clear_events(username);
        self.user_map.set_status(username, LabStatus::Terminating);

        let ns_api = kube::Api::<corev1::Namespace>::all(self.client.clone());
        match ns_api.delete(&user_namespace(username), &Default::default()).await {
            // A missing namespace means there is nothing left to clean up
            Ok(_) | Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => {
                let _ = self.user_map.remove(username);
                info!("lab environment deleted for {username}");
                Ok(())
            },
            Err(e) => {
                error!("could not delete lab environment for {username}: {e:#}");
                self.user_map.set_status(username, LabStatus::Failed);
                Err(e.into())
            },
        }
    }

    fn resources_for(&self, size: LabSize) -> anyhow::Result<UserResources> {
        let definition = self
            .config
            .size_definition(size)
            .ok_or_else(|| SpawnerError::unknown_size(&size.to_string()))?;
        let limits = definition.to_quantum()?;
        let requests = ResourceQuantum {
            cpu: limits.cpu * REQUEST_FRACTION,
            memory: (limits.memory as f64 * REQUEST_FRACTION) as i64,
        };
        Ok(UserResources { limits, requests })
    }
}

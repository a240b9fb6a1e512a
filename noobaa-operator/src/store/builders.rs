use snafu::ResultExt;
use stackable_operator::{
    builder::{
        meta::ObjectMetaBuilder,
        pod::{PodBuilder, container::ContainerBuilder, resources::ResourceRequirementsBuilder},
    },
    k8s_openapi::{
        api::{
            apps::v1::{StatefulSet, StatefulSetSpec},
            core::v1::{
                PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeMount,
                VolumeResourceRequirements,
            },
        },
        apimachinery::pkg::{
            api::resource::Quantity,
            apis::meta::v1::{LabelSelector, ObjectMeta},
        },
    },
    kube::ResourceExt,
    kvp::Labels,
};

use super::{
    error::{
        AddVolumeMountSnafu, BuildLabelSnafu, InvalidContainerNameSnafu, ObjectMetaSnafu, Result,
    },
    pool::volume_size,
};
use crate::{
    api::store::{PvPoolSpec, Store},
    manager::APP_NAME,
    resources::{ROLE_DEFAULT, object_labels, owned_meta},
};

pub const PV_POOL_CONTAINER: &str = "noobaa-agent";
pub const PV_POOL_VOLUME: &str = "noobaastorage";
pub const PV_POOL_MOUNT_PATH: &str = "/noobaa_storage";
const AGENT_COMMAND: &str = "/noobaa_init_files/noobaa_init.sh";

pub fn pv_pool_statefulset_name<S: Store>(store: &S) -> String {
    format!("{}-noobaa-pod", store.name_any())
}

/// One agent pod per volume of a pv pool backing store.
pub fn build_pv_pool_statefulset<S: Store>(
    store: &S,
    pv_pool: &PvPoolSpec,
    controller_name: &str,
    image: &str,
    mgmt_url: &str,
) -> Result<StatefulSet> {
    let name = pv_pool_statefulset_name(store);
    let labels = object_labels(store, controller_name, ROLE_DEFAULT);
    let selector =
        Labels::role_selector(store, APP_NAME, ROLE_DEFAULT).context(BuildLabelSnafu)?;

    let mut container = ContainerBuilder::new(PV_POOL_CONTAINER).context(
        InvalidContainerNameSnafu {
            name: PV_POOL_CONTAINER.to_string(),
        },
    )?;
    container
        .image(image)
        .command(vec![AGENT_COMMAND.to_string(), "agent".to_string()])
        .add_env_var("CONTAINER_PLATFORM", "KUBERNETES")
        .add_env_var("MGMT_URL", mgmt_url)
        .add_env_var("BACKINGSTORE_NAME", store.name_any())
        .add_volume_mounts(vec![VolumeMount {
            name: PV_POOL_VOLUME.to_string(),
            mount_path: PV_POOL_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        }])
        .context(AddVolumeMountSnafu)?
        .resources(
            ResourceRequirementsBuilder::new()
                .with_cpu_request("100m")
                .with_cpu_limit("100m")
                .with_memory_request("400Mi")
                .with_memory_limit("400Mi")
                .build(),
        );

    let pod_metadata = ObjectMetaBuilder::new()
        .with_recommended_labels(labels.clone())
        .context(ObjectMetaSnafu)?
        .build();
    let mut pod_builder = PodBuilder::new();
    pod_builder
        .metadata(pod_metadata)
        .add_container(container.build());

    let storage = Quantity(volume_size(pv_pool).to_string());
    let claim_template = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(PV_POOL_VOLUME.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: pv_pool.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some([("storage".to_string(), storage)].into()),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        status: None,
    };

    Ok(StatefulSet {
        metadata: owned_meta(store, &name, labels).context(ObjectMetaSnafu)?,
        spec: Some(StatefulSetSpec {
            pod_management_policy: Some("Parallel".to_string()),
            replicas: Some(pv_pool.num_volumes),
            selector: LabelSelector {
                match_labels: Some(selector.into()),
                ..LabelSelector::default()
            },
            service_name: name,
            template: pod_builder.build_template(),
            volume_claim_templates: Some(vec![claim_template]),
            ..StatefulSetSpec::default()
        }),
        status: None,
    })
}

//! Addresses and counts the system publishes in its status.

use stackable_operator::{
    k8s_openapi::{
        api::{
            apps::v1::Deployment,
            core::v1::{Pod, Service},
        },
        apimachinery::pkg::util::intstr::IntOrString,
    },
    kube::ResourceExt,
};

use crate::api::system::{EndpointsStatus, ServiceStatus};

/// Every address `service` can be reached at on its https port.
///
/// Node ports need the host of a backing pod, pod ports its ip.
pub fn service_status(service: &Service, https_port: &str, pod: Option<&Pod>) -> ServiceStatus {
    let mut status = ServiceStatus::default();
    let Some(spec) = &service.spec else {
        return status;
    };
    let Some(port) = spec
        .ports
        .iter()
        .flatten()
        .find(|port| port.name.as_deref() == Some(https_port))
    else {
        return status;
    };
    let https = |host: &str, port: i32| format!("https://{host}:{port}");
    let pod_status = pod.and_then(|pod| pod.status.as_ref());

    if let (Some(node_port), Some(host_ip)) = (
        port.node_port,
        pod_status.and_then(|s| s.host_ip.as_deref()),
    ) {
        status.node_ports.push(https(host_ip, node_port));
    }
    if let Some(pod_ip) = pod_status.and_then(|s| s.pod_ip.as_deref()) {
        let target = match &port.target_port {
            Some(IntOrString::Int(target)) => *target,
            _ => port.port,
        };
        status.pod_ports.push(https(pod_ip, target));
    }
    if let Some(cluster_ip) = spec.cluster_ip.as_deref().filter(|ip| *ip != "None") {
        status.internal_ip.push(https(cluster_ip, port.port));
    }
    let namespace = service.namespace().unwrap_or_default();
    status
        .internal_dns
        .push(https(&format!("{}.{namespace}.svc", service.name_any()), port.port));

    let ingress = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());
    for entry in ingress.into_iter().flatten() {
        if let Some(ip) = &entry.ip {
            status.external_ip.push(https(ip, port.port));
        }
        if let Some(hostname) = &entry.hostname {
            status.external_dns.push(https(hostname, port.port));
        }
    }
    status
}

pub fn endpoints_status(deployment: &Deployment, virtual_hosts: Vec<String>) -> EndpointsStatus {
    EndpointsStatus {
        ready_count: deployment
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0),
        virtual_hosts,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn service() -> Service {
        serde_json::from_value(json!({
            "metadata": { "name": "noobaa-mgmt", "namespace": "noobaa" },
            "spec": {
                "type": "LoadBalancer",
                "clusterIP": "10.96.0.12",
                "ports": [
                    { "name": "mgmt", "port": 80, "targetPort": 8080, "nodePort": 30080 },
                    { "name": "mgmt-https", "port": 443, "targetPort": 8443, "nodePort": 30443 },
                ],
            },
            "status": {
                "loadBalancer": { "ingress": [{ "hostname": "lb.example.com" }] },
            },
        }))
        .unwrap()
    }

    #[test]
    fn test_service_status_with_pod() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "noobaa-core-0" },
            "status": { "hostIP": "192.168.1.7", "podIP": "10.244.0.5" },
        }))
        .unwrap();
        let status = service_status(&service(), "mgmt-https", Some(&pod));
        assert_eq!(status.node_ports, vec!["https://192.168.1.7:30443"]);
        assert_eq!(status.pod_ports, vec!["https://10.244.0.5:8443"]);
        assert_eq!(status.internal_ip, vec!["https://10.96.0.12:443"]);
        assert_eq!(status.internal_dns, vec!["https://noobaa-mgmt.noobaa.svc:443"]);
        assert_eq!(status.external_dns, vec!["https://lb.example.com:443"]);
        assert!(status.external_ip.is_empty());
    }

    #[test]
    fn test_service_status_without_pod() {
        let status = service_status(&service(), "mgmt-https", None);
        assert!(status.node_ports.is_empty());
        assert!(status.pod_ports.is_empty());
        assert_eq!(status.internal_dns.len(), 1);

        assert_eq!(
            service_status(&service(), "missing", None),
            ServiceStatus::default()
        );
    }

    #[test]
    fn test_endpoints_status() {
        let deployment: Deployment =
            serde_json::from_value(json!({ "status": { "readyReplicas": 2 } })).unwrap();
        let status = endpoints_status(&deployment, vec!["s3.noobaa.svc".into()]);
        assert_eq!(status.ready_count, 2);
        assert_eq!(status.virtual_hosts, vec!["s3.noobaa.svc"]);
    }
}

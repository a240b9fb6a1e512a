//! The human readable summary kept in `status.readme`.

use crate::{
    api::system::{NooBaa, NooBaaStatus},
    remote::{ADMIN_SECRET, MGMT_SERVICE, S3_SERVICE},
};

fn first_or<'a>(addrs: &'a [String], fallback: &'a str) -> &'a str {
    addrs.first().map_or(fallback, String::as_str)
}

pub fn ready_readme(nb: &NooBaa, status: &NooBaaStatus, note: Option<&str>) -> String {
    let namespace = nb.metadata.namespace.as_deref().unwrap_or_default();
    let services = status.services.clone().unwrap_or_default();
    let mgmt = first_or(&services.service_mgmt.external_dns, "");
    let mgmt = if mgmt.is_empty() {
        first_or(&services.service_mgmt.internal_dns, MGMT_SERVICE)
    } else {
        mgmt
    };
    let s3 = first_or(&services.service_s3.external_dns, "");
    let s3 = if s3.is_empty() {
        first_or(&services.service_s3.internal_dns, S3_SERVICE)
    } else {
        s3
    };

    let mut readme = format!(
        "\nWelcome to NooBaa!\n\
         -----------------\n\
         NooBaa Core Version: {image}\n\n\
         Lets get started:\n\n\
         1. Management console: {mgmt}\n\n\
         2. S3 endpoint: {s3}\n\n\
         3. Admin credentials are in secret {ADMIN_SECRET}:\n\n\
         \tkubectl get secret {ADMIN_SECRET} -n {namespace} -o yaml\n",
        image = status.actual_image.as_deref().unwrap_or("unknown"),
    );
    if let Some(note) = note {
        readme.push_str(&format!("\nNote: {note}\n"));
    }
    readme
}

pub fn progressing_readme(nb: &NooBaa, status: &NooBaaStatus) -> String {
    let phase = status.phase.unwrap_or_default();
    format!(
        "\nNooBaa operator is still working to reconcile this system.\n\
         Current phase: {phase}\n\n\
         Check the system status with:\n\n\
         \tkubectl get noobaa {name} -n {namespace} -o yaml\n",
        name = nb.metadata.name.as_deref().unwrap_or_default(),
        namespace = nb.metadata.namespace.as_deref().unwrap_or_default(),
    )
}

pub fn rejected_readme(nb: &NooBaa, reason: &str, message: &str) -> String {
    format!(
        "\nNooBaa operator cannot reconcile system {name}.\n\
         Reason: {reason}\n\
         {message}\n\n\
         The system stays rejected until its spec changes.\n",
        name = nb.metadata.name.as_deref().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            Phase,
            system::{ServiceStatus, ServicesStatus},
        },
        system::fixtures,
    };

    fn system() -> NooBaa {
        serde_yaml::from_str(fixtures::SYSTEM).unwrap()
    }

    #[test]
    fn test_ready_prefers_external_addresses() {
        let status = NooBaaStatus {
            phase: Some(Phase::Ready),
            actual_image: Some("noobaa/noobaa-core:5.0".into()),
            services: Some(ServicesStatus {
                service_mgmt: ServiceStatus {
                    external_dns: vec!["https://lb.example.com:443".into()],
                    internal_dns: vec!["https://noobaa-mgmt.noobaa.svc:443".into()],
                    ..ServiceStatus::default()
                },
                service_s3: ServiceStatus {
                    internal_dns: vec!["https://s3.noobaa.svc:443".into()],
                    ..ServiceStatus::default()
                },
            }),
            ..NooBaaStatus::default()
        };
        let readme = ready_readme(&system(), &status, None);
        assert!(readme.contains("Management console: https://lb.example.com:443"));
        assert!(readme.contains("S3 endpoint: https://s3.noobaa.svc:443"));
        assert!(readme.contains("noobaa/noobaa-core:5.0"));
        assert!(!readme.contains("Note:"));

        let readme = ready_readme(&system(), &status, Some("no default backing store"));
        assert!(readme.contains("Note: no default backing store"));
    }

    #[test]
    fn test_progressing_and_rejected() {
        let status = NooBaaStatus {
            phase: Some(Phase::Connecting),
            ..NooBaaStatus::default()
        };
        assert!(progressing_readme(&system(), &status).contains("Current phase: Connecting"));

        let readme = rejected_readme(&system(), "InvalidImage", "image x cannot be parsed");
        assert!(readme.contains("Reason: InvalidImage"));
        assert!(readme.contains("image x cannot be parsed"));
    }
}

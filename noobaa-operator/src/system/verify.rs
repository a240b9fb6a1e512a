//! Static checks on the system spec.
//!
//! Everything here only looks at the spec and the operator config, the
//! join secret contents are passed in by the caller.

use std::collections::BTreeMap;

use noobaa_rpc::ServiceRouter;
use semver::{Version, VersionReq};
use snafu::{OptionExt, ResultExt, ensure};

use super::error::{
    InvalidEndpointsSnafu, InvalidImageSnafu, InvalidImageVersionSnafu, InvalidJoinAddressSnafu,
    InvalidVersionConstraintSnafu, InvalidVirtualHostSnafu, MissingJoinSecretKeySnafu, Result,
    SystemNameMismatchSnafu,
};
use crate::{
    api::system::{EndpointsSpec, NooBaa},
    config::{OperatorConfig, image_name},
    remote::{JOIN_AUTH_TOKEN, JOIN_KEYS},
};

/// How far an image could be checked against the version constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageCheck {
    Verified(Version),
    /// Not the default image, or a tag that is not a version.
    Unchecked,
}

/// Where to reach a system this one joins, taken from a join secret.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinInfo {
    pub router: ServiceRouter,
    pub auth_token: String,
}

pub fn verify_name(nb: &NooBaa, config: &OperatorConfig) -> Result<()> {
    let name = nb.metadata.name.clone().unwrap_or_default();
    ensure!(
        name == config.system_name,
        SystemNameMismatchSnafu {
            name,
            expected: &config.system_name,
        }
    );
    Ok(())
}

/// Splits `image` into name and tag, rejecting references no registry accepts.
pub fn parse_image(image: &str) -> Result<(&str, Option<&str>)> {
    let invalid = |reason: &str| {
        InvalidImageSnafu {
            image,
            reason: reason.to_owned(),
        }
        .fail()
    };
    if image.trim().is_empty() {
        return invalid("empty reference");
    }
    if image.chars().any(char::is_whitespace) {
        return invalid("contains whitespace");
    }
    if image.ends_with(':') || image.ends_with('@') || image.ends_with('/') {
        return invalid("truncated reference");
    }
    let name = image_name(image);
    if name.is_empty() || name.split('/').any(str::is_empty) {
        return invalid("empty path component");
    }
    // the registry host may carry upper case, the repository path may not
    let path = name.split_once('/').map_or(name, |(_, path)| path);
    if path.chars().any(|c| c.is_ascii_uppercase()) {
        return invalid("repository names must be lower case");
    }
    let without_digest = image.split('@').next().unwrap_or(image);
    let tag = without_digest[name.len()..]
        .strip_prefix(':')
        .filter(|tag| !tag.is_empty());
    Ok((name, tag))
}

/// Reads a tag as a version, filling in missing minor and patch parts.
pub fn tag_version(tag: &str) -> Option<Version> {
    let tag = tag.strip_prefix('v').unwrap_or(tag);
    let split = tag.find(['-', '+']).unwrap_or(tag.len());
    let (core, rest) = tag.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let padded = (0..3)
        .map(|i| parts.get(i).copied().unwrap_or("0"))
        .collect::<Vec<_>>()
        .join(".");
    Version::parse(&format!("{padded}{rest}")).ok()
}

/// The default image must satisfy the configured constraint, other images are
/// accepted as they are.
pub fn verify_image(image: &str, config: &OperatorConfig) -> Result<ImageCheck> {
    let (name, tag) = parse_image(image)?;
    if name != config.default_image_name() {
        return Ok(ImageCheck::Unchecked);
    }
    let Some(version) = tag.and_then(tag_version) else {
        return Ok(ImageCheck::Unchecked);
    };
    let constraint = &config.image_version_constraint;
    let req = VersionReq::parse(constraint).context(InvalidVersionConstraintSnafu { constraint })?;
    ensure!(
        req.matches(&version),
        InvalidImageVersionSnafu {
            image,
            version: version.to_string(),
            constraint,
        }
    );
    Ok(ImageCheck::Verified(version))
}

pub fn verify_endpoints(endpoints: &EndpointsSpec) -> Result<()> {
    let (min, max) = (endpoints.min_count, endpoints.max_count);
    ensure!(min >= 1 && min <= max, InvalidEndpointsSnafu { min, max });
    for host in &endpoints.additional_virtual_hosts {
        ensure!(is_fqdn(host), InvalidVirtualHostSnafu { host });
    }
    Ok(())
}

/// A DNS-1123 subdomain with at least two labels.
pub fn is_fqdn(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = host.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
}

pub fn verify_join_data(name: &str, data: &BTreeMap<String, String>) -> Result<JoinInfo> {
    for key in JOIN_KEYS.iter().chain([&JOIN_AUTH_TOKEN]) {
        ensure!(
            data.get(*key).is_some_and(|value| !value.is_empty()),
            MissingJoinSecretKeySnafu { name, key: *key }
        );
    }
    let router = ServiceRouter::from_join_data(data).context(InvalidJoinAddressSnafu { name })?;
    let auth_token = data
        .get(JOIN_AUTH_TOKEN)
        .cloned()
        .context(MissingJoinSecretKeySnafu {
            name,
            key: JOIN_AUTH_TOKEN,
        })?;
    Ok(JoinInfo { router, auth_token })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        phase::{ErrorClass, PhaseError},
        system::{error::Error, fixtures},
    };

    fn system() -> NooBaa {
        serde_yaml::from_str(fixtures::SYSTEM).unwrap()
    }

    #[test]
    fn test_name_must_match_config() {
        let config = OperatorConfig::default();
        verify_name(&system(), &config).unwrap();

        let mut nb = system();
        nb.metadata.name = Some("second".into());
        let err = verify_name(&nb, &config).unwrap_err();
        assert_eq!(
            err.class(),
            ErrorClass::Persistent {
                reason: "InvalidSystemName".into()
            }
        );
    }

    #[test]
    fn test_parse_image() {
        assert_eq!(
            parse_image("noobaa/noobaa-core:5.0").unwrap(),
            ("noobaa/noobaa-core", Some("5.0"))
        );
        assert_eq!(
            parse_image("registry:5000/noobaa/noobaa-core@sha256:abc").unwrap(),
            ("registry:5000/noobaa/noobaa-core", None)
        );
        assert_eq!(parse_image("Quay.io/noobaa/core").unwrap().0, "Quay.io/noobaa/core");
        for bad in ["", "noobaa core:5", "noobaa/noobaa-core:", "noobaa//core", "noobaa/Core:1"] {
            assert!(
                matches!(parse_image(bad), Err(Error::InvalidImage { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_tag_version() {
        assert_eq!(tag_version("5.0"), Some(Version::new(5, 0, 0)));
        assert_eq!(tag_version("v5.18.2"), Some(Version::new(5, 18, 2)));
        assert_eq!(
            tag_version("5.18-20240101").unwrap().pre.as_str(),
            "20240101"
        );
        assert_eq!(tag_version("999"), Some(Version::new(999, 0, 0)));
        assert_eq!(tag_version("latest"), None);
        assert_eq!(tag_version("1.2.3.4"), None);
    }

    #[test]
    fn test_default_image_must_satisfy_constraint() {
        let config = OperatorConfig::default();
        assert_eq!(
            verify_image("noobaa/noobaa-core:5.0", &config).unwrap(),
            ImageCheck::Verified(Version::new(5, 0, 0))
        );

        let err = verify_image("noobaa/noobaa-core:999", &config).unwrap_err();
        assert_eq!(
            err.class(),
            ErrorClass::Persistent {
                reason: "InvalidImageVersion".into()
            }
        );
    }

    #[test]
    fn test_other_images_are_unchecked() {
        let config = OperatorConfig::default();
        assert_eq!(
            verify_image("example.com/custom/core:999", &config).unwrap(),
            ImageCheck::Unchecked
        );
        assert_eq!(
            verify_image("noobaa/noobaa-core:latest", &config).unwrap(),
            ImageCheck::Unchecked
        );
    }

    #[test]
    fn test_endpoint_bounds() {
        let mut endpoints = system().endpoints();
        verify_endpoints(&endpoints).unwrap();

        endpoints.max_count = 0;
        assert!(matches!(
            verify_endpoints(&endpoints),
            Err(Error::InvalidEndpoints { min: 1, max: 0 })
        ));

        endpoints.max_count = 3;
        endpoints.additional_virtual_hosts.push("not_a_host".into());
        assert!(matches!(
            verify_endpoints(&endpoints),
            Err(Error::InvalidVirtualHost { host }) if host == "not_a_host"
        ));
    }

    #[test]
    fn test_fqdn() {
        assert!(is_fqdn("s3.example.com"));
        assert!(is_fqdn("s3.example.com."));
        assert!(!is_fqdn("localhost"));
        assert!(!is_fqdn("S3.example.com"));
        assert!(!is_fqdn("-s3.example.com"));
        assert!(!is_fqdn("s3..example.com"));
    }

    #[test]
    fn test_join_data_needs_every_key() {
        let mut data: BTreeMap<String, String> = [
            ("mgmt_addr", "wss://remote:443/rpc/"),
            ("bg_addr", "wss://remote:8445/rpc/"),
            ("md_addr", "wss://remote:8444/rpc/"),
            ("hosted_agents_addr", "wss://remote:8446/rpc/"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        let err = verify_join_data("noobaa-join", &data).unwrap_err();
        assert!(matches!(
            &err,
            Error::MissingJoinSecretKey { key, .. } if key == "auth_token"
        ));
        assert_eq!(
            err.class(),
            ErrorClass::Persistent {
                reason: "InvalidJoinSecret".into()
            }
        );

        data.insert("auth_token".into(), "token".into());
        let join = verify_join_data("noobaa-join", &data).unwrap();
        assert_eq!(join.auth_token, "token");
        assert_eq!(join.router.bg_addr, "wss://remote:8445/rpc/");
    }
}

//! Request field validation
//!
//! Runs before any cluster call is made.

use std::num::NonZeroU32;
use std::sync::LazyLock;

use regex::Regex;
use stackpress_common::Error;

/// Kubernetes limit for a namespace (DNS-1123 label)
pub const MAX_NAMESPACE_LENGTH: usize = 63;

static DNS_LABEL_REGEX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$"));

static PREFIX_REGEX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z][-a-z0-9]*$"));

/// Validation result type
pub type ValidationResult<T> = Result<T, Error>;

fn is_match(pattern: &LazyLock<Result<Regex, regex::Error>>, value: &str) -> ValidationResult<bool> {
    match &**pattern {
        Ok(re) => Ok(re.is_match(value)),
        Err(e) => Err(Error::System(format!("invalid validation pattern: {}", e))),
    }
}

/// Namespace must be present and a DNS-1123 label
pub fn validate_namespace(namespace: &str) -> ValidationResult<()> {
    if namespace.is_empty() {
        return Err(Error::Validation("namespace is required".to_string()));
    }

    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(Error::Validation(format!(
            "namespace too long (max {} characters)",
            MAX_NAMESPACE_LENGTH
        )));
    }

    if !is_match(&DNS_LABEL_REGEX, namespace)? {
        return Err(Error::Validation(
            "namespace must consist of lowercase alphanumeric characters or '-', \
             and start and end with an alphanumeric character"
                .to_string(),
        ));
    }

    Ok(())
}

/// Deployment prefix charset check
///
/// Service names built from the prefix are DNS-1035 labels, so the prefix
/// must start with a letter. Length is not checked; long prefixes are
/// shortened when names are built.
pub fn validate_deployment_prefix(prefix: &str) -> ValidationResult<()> {
    if !is_match(&PREFIX_REGEX, prefix)? {
        return Err(Error::Validation(
            "deployment_name must consist of lowercase alphanumeric characters or '-', \
             and start with a letter"
                .to_string(),
        ));
    }

    Ok(())
}

/// Disk size in GB; absent or non-positive values fall back to `default`
pub fn disk_size_or_default(
    field: &str,
    value: Option<i64>,
    default: NonZeroU32,
) -> ValidationResult<NonZeroU32> {
    let Some(value) = value.filter(|v| *v > 0) else {
        return Ok(default);
    };

    if value > i64::from(i32::MAX) {
        return Err(Error::Validation(format!(
            "{} too large (maximum {} GB)",
            field,
            i32::MAX
        )));
    }

    u32::try_from(value)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| Error::Validation(format!("{} is not a valid size", field)))
}

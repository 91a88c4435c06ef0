//! Repository definition documents.

use indy_harness_config::PackageType;
use serde_json::{Value, json};

/// Hosted repository definition.
#[must_use]
pub fn hosted_definition(package_type: PackageType, name: &str) -> Value {
    json!({
        "key": format!("{package_type}:hosted:{name}"),
        "description": name,
        "metadata": { "changelog": format!("init hosted {name}") },
        "disabled": false,
        "snapshotTimeoutSeconds": 0,
        "readonly": false,
        "packageType": package_type.as_str(),
        "name": name,
        "type": "hosted",
        "disable_timeout": 0,
        "path_style": "plain",
        "authoritative_index": true,
        "allow_snapshots": true,
        "allow_releases": true
    })
}

/// Remote repository definition proxying the package type's upstream.
#[must_use]
pub fn remote_definition(package_type: PackageType, name: &str) -> Value {
    json!({
        "key": format!("{package_type}:remote:{name}"),
        "description": name,
        "metadata": { "changelog": format!("init remote {name}") },
        "disabled": false,
        "packageType": package_type.as_str(),
        "name": name,
        "type": "remote",
        "url": package_type.upstream_url(),
        "disable_timeout": 0,
        "path_style": "plain",
        "authoritative_index": true,
        "allow_snapshots": true,
        "allow_releases": true
    })
}

/// Group repository definition; constituent order is resolution order.
#[must_use]
pub fn group_definition(package_type: PackageType, name: &str, constituents: &[String]) -> Value {
    json!({
        "type": "group",
        "key": format!("{package_type}:group:{name}"),
        "metadata": { "changelog": format!("init group {name}") },
        "disabled": false,
        "constituents": constituents,
        "packageType": package_type.as_str(),
        "name": name,
        "disable_timeout": 0,
        "path_style": "plain",
        "authoritative_index": false,
        "prepend_constituent": false
    })
}

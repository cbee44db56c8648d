//! # Resource Path Tests
//!
//! These tests verify:
//! - Case-insensitive matching of the fixed path segments
//! - Exact extraction of group, provider, parent, type and name
//! - Rejection of malformed paths

use azure_permissions_checker::controller::resource_path::{ResourcePath, ResourceRef};

const SUBSCRIPTION: &str = "01234567-89ab-cdef-fedc-ba9876543210";

fn resource(path: &str) -> ResourceRef {
    match ResourcePath::parse(path) {
        Some(ResourcePath::Resource(resource)) => resource,
        other => panic!("expected a resource for {path:?}, got {other:?}"),
    }
}

#[test]
fn test_fixed_segments_are_case_insensitive() {
    for path in [
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg"),
        format!("/SUBSCRIPTIONS/{SUBSCRIPTION}/RESOURCEGROUPS/rg"),
        format!("/Subscriptions/{}/resourcegroups/rg", SUBSCRIPTION.to_uppercase()),
    ] {
        assert!(
            matches!(ResourcePath::parse(&path), Some(ResourcePath::ResourceGroup(ref g)) if g.group == "rg"),
            "{path} should be a resource group"
        );
    }
}

#[test]
fn test_group_name_characters() {
    let path = format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/MC_my.rg-(prod)_westeurope");
    let parsed = ResourcePath::parse(&path).unwrap();
    assert_eq!(parsed.group(), "MC_my.rg-(prod)_westeurope");
}

#[test]
fn test_resource_fields_keep_original_case() {
    let r = resource(&format!(
        "/subscriptions/{SUBSCRIPTION}/resourcegroups/Test-RG/PROVIDERS/Microsoft.Compute/virtualMachines/VM-01"
    ));
    assert_eq!(r.subscription, SUBSCRIPTION);
    assert_eq!(r.group, "Test-RG");
    assert_eq!(r.provider, "Microsoft.Compute");
    assert_eq!(r.parent_path, "");
    assert_eq!(r.resource_type, "virtualMachines");
    assert_eq!(r.resource_name, "VM-01");
}

#[test]
fn test_deeply_nested_parent_path() {
    let r = resource(&format!(
        "/subscriptions/{SUBSCRIPTION}/resourceGroups/rg/providers/Microsoft.Sql/servers/sql1/databases/db1/backupShortTermRetentionPolicies/default"
    ));
    assert_eq!(r.provider, "Microsoft.Sql");
    assert_eq!(r.parent_path, "servers/sql1/databases/db1");
    assert_eq!(r.resource_type, "backupShortTermRetentionPolicies");
    assert_eq!(r.resource_name, "default");
}

#[test]
fn test_invalid_paths_do_not_match() {
    let invalid = [
        String::new(),
        "invalid path".to_string(),
        "/subscriptions/not-a-guid/resourceGroups/rg".to_string(),
        format!("/subscriptions/{SUBSCRIPTION}"),
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/"),
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg/"),
        format!("subscriptions/{SUBSCRIPTION}/resourceGroups/rg"),
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg/providers/Microsoft.Compute"),
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg/providers/Microsoft.Compute/disks"),
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg with space"),
    ];
    for path in invalid {
        assert_eq!(ResourcePath::parse(&path), None, "{path:?} should not match");
    }
}

//! Deterministic naming of owned objects
//!
//! The naming scheme is a contract with users: namespace = group name,
//! deployment = `<group>.<placement>`, resource = `<deployment>.<kebab(name)>`.
//! Idempotent create-or-update relies on these names never changing for a
//! given input.

/// Name of the ResourceGroupDeployment for one (group, placement) pair
pub fn deployment_name(group: &str, placement: &str) -> String {
    format!("{group}.{placement}")
}

/// Name of the Resource object scheduled by a deployment
pub fn resource_object_name(deployment: &str, resource: &str) -> String {
    format!("{deployment}.{}", kebab_case(resource))
}

/// Convert an arbitrary resource name into its kebab-case form
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('-').to_string()
}

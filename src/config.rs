use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::claims::ClaimDescriptor;
use crate::consent::DEFAULT_JURISDICTION;
use crate::idp::{ExternalIdpConfig, IdpMetadata};
use crate::provisioning::{DEFAULT_SUPER_TENANT, HandlerSettings, SignUpEndpoints};
use crate::types::TenantDomain;

/// Contents of `provisioning.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningConfig {
    #[serde(default)]
    pub endpoints: SignUpEndpoints,
    #[serde(default = "default_super_tenant")]
    pub super_tenant: String,
    #[serde(default = "default_jurisdiction")]
    pub jurisdiction: String,
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantConfig>,
}

/// Everything configured for one tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    #[serde(default)]
    pub resident_idp: Option<IdpMetadata>,
    /// The tenant's claim dialect.
    #[serde(default)]
    pub claims: Vec<ClaimDescriptor>,
    #[serde(default)]
    pub idps: Vec<ExternalIdpConfig>,
}

fn default_super_tenant() -> String {
    DEFAULT_SUPER_TENANT.to_string()
}

fn default_jurisdiction() -> String {
    DEFAULT_JURISDICTION.to_string()
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            endpoints: SignUpEndpoints::default(),
            super_tenant: default_super_tenant(),
            jurisdiction: default_jurisdiction(),
            tenants: BTreeMap::new(),
        }
    }
}

impl ProvisioningConfig {
    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            endpoints: self.endpoints.clone(),
            super_tenant: TenantDomain::new(self.super_tenant.as_str()),
            jurisdiction: self.jurisdiction.clone(),
        }
    }

    /// A small working configuration, written by `jit-provisioner init`.
    pub fn sample() -> Self {
        let tenant = TenantConfig {
            resident_idp: Some(IdpMetadata {
                home_realm_id: Some("acme".to_string()),
                description: None,
                display_name: Some("Acme".to_string()),
            }),
            claims: vec![
                ClaimDescriptor::new("http://wso2.org/claims/emailaddress")
                    .with_display_name("Email"),
                ClaimDescriptor::new("http://wso2.org/claims/country").with_display_name("Country"),
                ClaimDescriptor::new("http://wso2.org/claims/givenname")
                    .with_display_name("First Name"),
            ],
            idps: vec![
                ExternalIdpConfig::new("GoogleIdP")
                    .with_provisioning(true)
                    .with_password_provisioning(true)
                    .with_role_claim("groups")
                    .with_role_mapping("engineering", "developer"),
            ],
        };

        let mut config = Self::default();
        config.tenants.insert("acme".to_string(), tenant);
        config
    }
}

pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = env::var("JIT_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("jit").join("provisioning.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("provisioning.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow::anyhow!(
        "Could not find provisioning.json (set JIT_CONFIG or create ./provisioning.json)"
    ))
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

/// Expand `${VAR}` in every string value. Object keys are left alone.
fn expand_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(expand_env_vars(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(expand_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, expand_value(v)))
                .collect(),
        ),
        other => other,
    }
}

pub fn load_config_from(path: &Path) -> anyhow::Result<ProvisioningConfig> {
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    Ok(serde_json::from_value(expand_value(value))?)
}

pub fn load_config() -> anyhow::Result<ProvisioningConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test-local variable name, not read by other tests.
        unsafe { env::set_var("JIT_TEST_SIGNUP_HOST", "login.acme.example") };
        assert_eq!(
            expand_env_vars("https://${JIT_TEST_SIGNUP_HOST}/signup.do"),
            "https://login.acme.example/signup.do"
        );
        assert_eq!(expand_env_vars("${JIT_TEST_UNSET_VAR}"), "${JIT_TEST_UNSET_VAR}");
        assert_eq!(expand_env_vars("plain $ text"), "plain $ text");
    }

    #[test]
    fn test_load_config_from_file() {
        unsafe { env::set_var("JIT_TEST_REALM", "acme-realm") };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "endpoints": {{
                    "signUp": "https://id.acme.example/signup.do",
                    "registration": "https://id.acme.example/register.do"
                }},
                "tenants": {{
                    "acme": {{
                        "residentIdp": {{ "homeRealmId": "${{JIT_TEST_REALM}}" }},
                        "claims": [{{ "uri": "http://wso2.org/claims/country", "displayName": "Country" }}],
                        "idps": [{{ "name": "GoogleIdP", "provisioningEnabled": true }}]
                    }}
                }}
            }}"#
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.super_tenant, DEFAULT_SUPER_TENANT);
        assert_eq!(config.jurisdiction, "USA");
        assert_eq!(config.endpoints.sign_up, "https://id.acme.example/signup.do");

        let acme = &config.tenants["acme"];
        assert_eq!(
            acme.resident_idp.as_ref().unwrap().home_realm_id.as_deref(),
            Some("acme-realm")
        );
        assert_eq!(acme.claims.len(), 1);
        assert!(acme.idps[0].provisioning_enabled);

        let settings = config.handler_settings();
        assert_eq!(settings.super_tenant.as_str(), DEFAULT_SUPER_TENANT);
    }

    #[test]
    fn test_sample_round_trips() {
        let sample = ProvisioningConfig::sample();
        let json = serde_json::to_string_pretty(&sample).unwrap();
        let parsed: ProvisioningConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tenants["acme"].idps, sample.tenants["acme"].idps);
    }
}

// opstool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_WORK_DIR: &str = ".";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_REGION: &str = "us-east-1";

// Environment overrides so credentials can stay out of config.json.
const ACCESS_KEY_ENV: &str = "OBJECT_STORAGE_ACCESS_KEY";
const SECRET_KEY_ENV: &str = "OBJECT_STORAGE_SECRET_KEY";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonStorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonMongoConfig {
    pub db_name: Option<String>,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub collections: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSshConfig {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonDeployConfig {
    pub app_dir: Option<String>,
    pub staging_dir: Option<String>,
    pub repo_url: Option<String>,
    pub site_url: Option<String>,
    pub staging_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub work_dir: Option<PathBuf>,
    pub mongo: Option<JsonMongoConfig>,
    pub object_storage: Option<JsonStorageConfig>,
    pub roles: Option<HashMap<String, Vec<String>>>,
    pub ssh: Option<JsonSshConfig>,
    pub deploy: Option<JsonDeployConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub db_name: String,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub collections: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub user: String,
    pub port: u16,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub app_dir: String,
    pub staging_dir: String,
    pub repo_url: String,
    pub site_url: String,
    pub staging_url: String,
}

/// A class of remote host sharing one task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Web,
    App,
    Db,
    Task,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Web => "web",
            Role::App => "app",
            Role::Db => "db",
            Role::Task => "task",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        match name {
            "web" => Some(Role::Web),
            "app" => Some(Role::App),
            "db" => Some(Role::Db),
            "task" => Some(Role::Task),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub work_dir: PathBuf,
    pub storage: Option<StorageConfig>,
    pub roles: HashMap<Role, Vec<String>>,
    pub raw: RawJsonConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;

        let storage = build_storage_config(raw.object_storage.as_ref(), |key| env::var(key).ok());
        let roles = parse_roles(raw.roles.as_ref())?;
        let work_dir = raw
            .work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

        Ok(AppConfig {
            work_dir,
            storage,
            roles,
            raw,
        })
    }

    pub fn storage(&self) -> Result<&StorageConfig> {
        self.storage.as_ref().context(
            "object_storage (bucket_name, access_key_id, secret_access_key) must be configured for this operation",
        )
    }

    pub fn hosts_for(&self, role: Role) -> Result<&[String]> {
        let hosts = self.roles.get(&role).map(|h| h.as_slice()).unwrap_or(&[]);
        if hosts.is_empty() {
            return Err(anyhow::anyhow!(
                "No hosts configured for role {} in config.json",
                role.as_str()
            ));
        }
        Ok(hosts)
    }
}

/// Builds the object store configuration if the section is complete.
/// Credentials may come from the environment instead of config.json; an
/// incomplete section disables store operations with a warning rather than
/// failing startup.
fn build_storage_config(
    raw_storage: Option<&JsonStorageConfig>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Option<StorageConfig> {
    let s3_raw = raw_storage?;
    let access_key_id = env_lookup(ACCESS_KEY_ENV)
        .or_else(|| s3_raw.access_key_id.clone())
        .filter(|s| !s.is_empty());
    let secret_access_key = env_lookup(SECRET_KEY_ENV)
        .or_else(|| s3_raw.secret_access_key.clone())
        .filter(|s| !s.is_empty());

    if let (Some(bucket), Some(key_id), Some(secret)) = (
        s3_raw.bucket_name.as_ref().filter(|s| !s.is_empty()),
        access_key_id,
        secret_access_key,
    ) {
        Some(StorageConfig {
            bucket_name: bucket.clone(),
            region: s3_raw
                .region
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id: key_id,
            secret_access_key: secret,
            endpoint_url: s3_raw.endpoint_url.clone().filter(|s| !s.is_empty()),
        })
    } else {
        if s3_raw.bucket_name.is_some()
            || s3_raw.access_key_id.is_some()
            || s3_raw.secret_access_key.is_some()
        {
            println!(
                "object_storage is present in config.json but bucket_name, access_key_id, or secret_access_key is missing or empty. Object store operations will be disabled."
            );
        }
        None
    }
}

fn parse_roles(
    raw_roles: Option<&HashMap<String, Vec<String>>>,
) -> Result<HashMap<Role, Vec<String>>> {
    let mut roles = HashMap::new();
    if let Some(map) = raw_roles {
        for (name, hosts) in map {
            let role = Role::from_name(name).with_context(|| {
                format!(
                    "Unknown role {} in config.json (expected web, app, db, or task)",
                    name
                )
            })?;
            roles.insert(role, hosts.clone());
        }
    }
    Ok(roles)
}

pub fn load_mongo_config(raw: &RawJsonConfig) -> Result<MongoConfig> {
    let mongo = raw
        .mongo
        .as_ref()
        .context("mongo section must be set in config.json for backup/restore")?;
    let db_name = mongo
        .db_name
        .as_ref()
        .filter(|s| !s.is_empty())
        .context("mongo.db_name must be set in config.json")?
        .clone();

    let collections: Vec<String> = mongo
        .collections
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();
    if collections.is_empty() {
        return Err(anyhow::anyhow!(
            "mongo.collections must list at least one collection in config.json"
        ));
    }
    if collections.iter().any(|c| c.is_empty()) {
        return Err(anyhow::anyhow!(
            "mongo.collections contains an empty collection name"
        ));
    }

    Ok(MongoConfig {
        db_name,
        host: mongo.host.clone().filter(|s| !s.is_empty()),
        username: mongo.username.clone().filter(|s| !s.is_empty()),
        password: mongo.password.clone().filter(|s| !s.is_empty()),
        collections,
    })
}

pub fn load_ssh_config(raw: &RawJsonConfig) -> Result<SshConfig> {
    let ssh = raw
        .ssh
        .as_ref()
        .context("ssh section must be set in config.json for remote tasks")?;
    let user = ssh
        .user
        .as_ref()
        .filter(|s| !s.is_empty())
        .context("ssh.user must be set in config.json")?
        .clone();
    Ok(SshConfig {
        user,
        port: ssh.port.unwrap_or(DEFAULT_SSH_PORT),
        password: ssh.password.clone().filter(|s| !s.is_empty()),
    })
}

/// Deployment paths and URLs, all defaulted so the task catalog can always
/// be listed even with a minimal config.json.
pub fn load_deploy_config(raw: &RawJsonConfig) -> DeployConfig {
    let deploy = raw.deploy.as_ref();
    let pick = |value: Option<&String>, default: &str| {
        value
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };
    DeployConfig {
        app_dir: pick(deploy.and_then(|d| d.app_dir.as_ref()), "~/app"),
        staging_dir: pick(deploy.and_then(|d| d.staging_dir.as_ref()), "~/staging"),
        repo_url: pick(deploy.and_then(|d| d.repo_url.as_ref()), ""),
        site_url: pick(deploy.and_then(|d| d.site_url.as_ref()), "http://localhost"),
        staging_url: pick(
            deploy.and_then(|d| d.staging_url.as_ref()),
            "http://localhost",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_from(value: serde_json::Value) -> RawJsonConfig {
        serde_json::from_value(value).expect("test config should deserialize")
    }

    #[test]
    fn test_storage_config_complete() {
        let raw = raw_from(json!({
            "object_storage": {
                "bucket_name": "backups",
                "access_key_id": "AKIA",
                "secret_access_key": "shhh",
                "endpoint_url": "https://nyc3.digitaloceanspaces.com"
            }
        }));
        let storage = build_storage_config(raw.object_storage.as_ref(), |_| None)
            .expect("complete section should build");
        assert_eq!(storage.bucket_name, "backups");
        assert_eq!(storage.region, DEFAULT_REGION);
        assert_eq!(
            storage.endpoint_url.as_deref(),
            Some("https://nyc3.digitaloceanspaces.com")
        );
    }

    #[test]
    fn test_storage_config_incomplete_is_disabled() {
        let raw = raw_from(json!({
            "object_storage": { "bucket_name": "backups" }
        }));
        assert!(build_storage_config(raw.object_storage.as_ref(), |_| None).is_none());
        assert!(build_storage_config(None, |_| None).is_none());
    }

    #[test]
    fn test_storage_config_credentials_from_environment() {
        let raw = raw_from(json!({
            "object_storage": { "bucket_name": "backups", "region": "ams3" }
        }));
        let storage = build_storage_config(raw.object_storage.as_ref(), |key| match key {
            ACCESS_KEY_ENV => Some("env-key".to_string()),
            SECRET_KEY_ENV => Some("env-secret".to_string()),
            _ => None,
        })
        .expect("environment credentials should complete the section");
        assert_eq!(storage.access_key_id, "env-key");
        assert_eq!(storage.secret_access_key, "env-secret");
        assert_eq!(storage.region, "ams3");
    }

    #[test]
    fn test_mongo_config_requires_collections() {
        let raw = raw_from(json!({
            "mongo": { "db_name": "reader", "collections": [] }
        }));
        assert!(load_mongo_config(&raw).is_err());

        let raw = raw_from(json!({ "mongo": { "db_name": "reader" } }));
        assert!(load_mongo_config(&raw).is_err());
    }

    #[test]
    fn test_mongo_config_trims_collection_names() -> Result<()> {
        let raw = raw_from(json!({
            "mongo": {
                "db_name": "reader",
                "host": "db01.example.com",
                "collections": [" stories", "classifiers ", "starred_stories"]
            }
        }));
        let mongo = load_mongo_config(&raw)?;
        assert_eq!(mongo.db_name, "reader");
        assert_eq!(mongo.host.as_deref(), Some("db01.example.com"));
        assert_eq!(
            mongo.collections,
            vec!["stories", "classifiers", "starred_stories"]
        );
        Ok(())
    }

    #[test]
    fn test_parse_roles_known_and_unknown() -> Result<()> {
        let mut map = HashMap::new();
        map.insert("web".to_string(), vec!["www.example.com".to_string()]);
        map.insert(
            "db".to_string(),
            vec![
                "db01.example.com".to_string(),
                "db02.example.com".to_string(),
            ],
        );
        let roles = parse_roles(Some(&map))?;
        assert_eq!(roles[&Role::Web], vec!["www.example.com"]);
        assert_eq!(roles[&Role::Db].len(), 2);

        let mut bad = HashMap::new();
        bad.insert("cache".to_string(), vec!["c1".to_string()]);
        assert!(parse_roles(Some(&bad)).is_err());
        Ok(())
    }

    #[test]
    fn test_ssh_config_defaults_port() -> Result<()> {
        let raw = raw_from(json!({ "ssh": { "user": "deploy" } }));
        let ssh = load_ssh_config(&raw)?;
        assert_eq!(ssh.user, "deploy");
        assert_eq!(ssh.port, DEFAULT_SSH_PORT);
        assert!(ssh.password.is_none());

        let raw = raw_from(json!({ "ssh": {} }));
        assert!(load_ssh_config(&raw).is_err());
        Ok(())
    }

    #[test]
    fn test_deploy_config_defaults() {
        let raw = raw_from(json!({}));
        let deploy = load_deploy_config(&raw);
        assert_eq!(deploy.app_dir, "~/app");
        assert_eq!(deploy.staging_dir, "~/staging");

        let raw = raw_from(json!({
            "deploy": { "app_dir": "~/reader", "site_url": "http://reader.example.com" }
        }));
        let deploy = load_deploy_config(&raw);
        assert_eq!(deploy.app_dir, "~/reader");
        assert_eq!(deploy.site_url, "http://reader.example.com");
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{FlakersError, Result};

pub const URL: &str = "URL";
pub const USER: &str = "USER";
pub const PASSWORD: &str = "PASSWORD";
pub const ROLE: &str = "ROLE";
pub const WAREHOUSE: &str = "WAREHOUSE";
pub const DB: &str = "DB";
pub const SCHEMA: &str = "SCHEMA";
pub const ACCOUNT: &str = "ACCOUNT";
pub const NETWORK_TIMEOUT: &str = "NETWORK_TIMEOUT";

const DATABASE_ALIAS: &str = "DATABASE";
const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(60);

/// Typed view of the string-keyed session configuration.
///
/// Keys are case-insensitive. Keys that are not recognized here are kept in
/// [`SessionConfig::parameters`] and forwarded to the service as session parameters.
#[derive(Clone)]
pub struct SessionConfig {
    pub url: Url,
    pub user: String,
    pub password: String,
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub account: Option<String>,
    pub network_timeout: Duration,
    pub parameters: BTreeMap<String, String>,
}

impl SessionConfig {
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut entries: BTreeMap<String, String> = map
            .iter()
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_string()))
            .filter(|(_, v)| !v.is_empty())
            .collect();

        let raw_url = entries
            .remove(URL)
            .ok_or_else(|| FlakersError::InvalidConfig(format!("missing {}", URL)))?;
        let url = Url::parse(&raw_url)
            .map_err(|e| FlakersError::InvalidConfig(format!("{} {:?}: {}", URL, raw_url, e)))?;

        let user = entries
            .remove(USER)
            .ok_or_else(|| FlakersError::InvalidConfig(format!("missing {}", USER)))?;
        let password = entries
            .remove(PASSWORD)
            .ok_or_else(|| FlakersError::InvalidConfig(format!("missing {}", PASSWORD)))?;

        let database = match (entries.remove(DB), entries.remove(DATABASE_ALIAS)) {
            (Some(db), _) => Some(db),
            (None, alias) => alias,
        };

        let network_timeout = match entries.remove(NETWORK_TIMEOUT) {
            Some(secs) => secs.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                FlakersError::InvalidConfig(format!(
                    "{} must be a whole number of seconds, got {:?}",
                    NETWORK_TIMEOUT, secs
                ))
            })?,
            None => DEFAULT_NETWORK_TIMEOUT,
        };

        Ok(Self {
            url,
            user,
            password,
            role: entries.remove(ROLE),
            warehouse: entries.remove(WAREHOUSE),
            database,
            schema: entries.remove(SCHEMA),
            account: entries.remove(ACCOUNT),
            network_timeout,
            parameters: entries,
        })
    }

    /// The account identifier: `ACCOUNT` if set, otherwise the first label of the URL host.
    pub fn account_name(&self) -> String {
        if let Some(account) = &self.account {
            return account.clone();
        }
        self.url
            .host_str()
            .and_then(|host| host.split('.').next())
            .unwrap_or_default()
            .to_string()
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url.as_str())
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("account", &self.account)
            .field("network_timeout", &self.network_timeout)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Reads configuration overrides from environment variables named `<PREFIX>_<KEY>`.
/// Returned keys are upper case, without the prefix.
pub fn env_overrides(prefix: &str) -> Result<HashMap<String, String>> {
    collect_overrides(::config::Environment::with_prefix(prefix))
}

fn collect_overrides(source: ::config::Environment) -> Result<HashMap<String, String>> {
    let settings = ::config::Config::builder()
        .add_source(source)
        .build()
        .map_err(|e| FlakersError::InvalidConfig(format!("failed to read environment: {}", e)))?;
    let values: HashMap<String, String> = settings
        .try_deserialize()
        .map_err(|e| FlakersError::InvalidConfig(format!("failed to read environment: {}", e)))?;
    Ok(values
        .into_iter()
        .map(|(k, v)| (k.to_ascii_uppercase(), v))
        .collect())
}

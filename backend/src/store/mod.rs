//! Code lookup store.
//!
//! Lookups are fetched fresh for every file, before the engine runs:
//! - [`LookupSnapshot`] - in-memory lookups, loadable from a JSON file
//! - [`PgLookupStore`] - the product and merchant tables in PostgreSQL
//!
//! An unreachable database yields empty lookups, never an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_postgres::{Client, Config, NoTls};

use crate::api::logs::{log_error, log_info, log_success};
use crate::error::StoreError;
use crate::transform::mapping::{CodeLookup, CodeLookupProvider};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SKU_QUERY: &str = "
    SELECT DISTINCT ON (client_sku_code)
        client_sku_code,
        fd_sku_code
    FROM products
    WHERE client_sku_code IS NOT NULL AND fd_sku_code IS NOT NULL
    ORDER BY client_sku_code, fd_sku_code";

const LOCATION_QUERY: &str = "
    SELECT
        ms.supplier_code AS client_code,
        m.generated_code AS fd_code
    FROM merchants m
    JOIN merchant_suppliers ms ON m.id = ms.merchant_id
    WHERE ms.supplier_code IS NOT NULL AND m.generated_code IS NOT NULL";

// =============================================================================
// Snapshot
// =============================================================================

/// A resolved set of lookups.
///
/// ```json
/// {"sku": {"X1": "F100"}, "locations": {"L2": ["FD-2", "FD-3"]}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSnapshot {
    /// Client SKU code to canonical SKU
    #[serde(default)]
    pub sku: HashMap<String, String>,
    /// Client location code to candidate canonical locations
    #[serde(default)]
    pub locations: HashMap<String, Vec<String>>,
}

impl LookupSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn is_empty(&self) -> bool {
        self.sku.is_empty() && self.locations.is_empty()
    }
}

impl CodeLookupProvider for LookupSnapshot {
    fn sku_mapping(&self) -> CodeLookup {
        CodeLookup::OneToOne(self.sku.clone())
    }

    fn location_mapping(&self) -> CodeLookup {
        CodeLookup::one_to_many(self.locations.iter().flat_map(|(raw, candidates)| {
            candidates
                .iter()
                .map(move |candidate| (raw.clone(), candidate.clone()))
        }))
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// Connection settings, read from `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`
/// and `DB_PASSWORD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl PgSettings {
    /// `Ok(None)` when no database is configured.
    pub fn from_env() -> Result<Option<Self>, StoreError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let Some(host) = var("DB_HOST") else {
            return Ok(None);
        };
        let port = match var("DB_PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|_| StoreError::Config(format!("DB_PORT is not a port number: {}", port)))?,
            None => 5432,
        };

        Ok(Some(Self {
            host,
            port,
            dbname: var("DB_NAME"),
            user: var("DB_USER"),
            password: var("DB_PASSWORD"),
        }))
    }

    fn config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.connect_timeout(CONNECT_TIMEOUT);
        if let Some(dbname) = &self.dbname {
            config.dbname(dbname);
        }
        if let Some(user) = &self.user {
            config.user(user);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

/// Lookups served from the product and merchant tables.
pub struct PgLookupStore {
    settings: PgSettings,
}

impl PgLookupStore {
    pub fn new(settings: PgSettings) -> Self {
        Self { settings }
    }

    /// A store for the configured database, if any.
    pub fn from_env() -> Result<Option<Self>, StoreError> {
        Ok(PgSettings::from_env()?.map(Self::new))
    }

    async fn connect(&self) -> Result<Client, StoreError> {
        let config = self.settings.config();
        let connecting = config.connect(NoTls);
        let (client, connection) = tokio::time::timeout(CONNECT_TIMEOUT, connecting)
            .await
            .map_err(|_| StoreError::Timeout)??;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log_error(format!("Database connection error: {}", e));
            }
        });

        Ok(client)
    }

    async fn fetch_sku(client: &Client) -> Result<HashMap<String, String>, StoreError> {
        let mut mapping = HashMap::new();
        for row in client.query(SKU_QUERY, &[]).await? {
            let client_code: String = row.try_get(0)?;
            let fd_code: String = row.try_get(1)?;
            mapping.insert(client_code, fd_code);
        }
        Ok(mapping)
    }

    async fn fetch_locations(
        client: &Client,
    ) -> Result<HashMap<String, Vec<String>>, StoreError> {
        let mut mapping: HashMap<String, Vec<String>> = HashMap::new();
        for row in client.query(LOCATION_QUERY, &[]).await? {
            let client_code: String = row.try_get(0)?;
            let fd_code: String = row.try_get(1)?;
            mapping.entry(client_code).or_default().push(fd_code);
        }
        Ok(mapping)
    }

    /// Fetch both lookups. Failures are logged and leave that lookup empty.
    pub async fn fetch_snapshot(&self) -> LookupSnapshot {
        let client = match self.connect().await {
            Ok(client) => client,
            Err(e) => {
                log_error(format!("Database connection failed: {}", e));
                return LookupSnapshot::new();
            }
        };

        let sku = match Self::fetch_sku(&client).await {
            Ok(sku) => {
                log_success(format!("Loaded {} unique client SKU mappings", sku.len()));
                sku
            }
            Err(e) => {
                log_error(format!("Error fetching SKU mapping: {}", e));
                HashMap::new()
            }
        };

        let locations = match Self::fetch_locations(&client).await {
            Ok(locations) => {
                log_success(format!(
                    "Loaded {} client location mappings",
                    locations.len()
                ));
                locations
            }
            Err(e) => {
                log_error(format!("Error fetching location mapping: {}", e));
                HashMap::new()
            }
        };

        LookupSnapshot { sku, locations }
    }
}

/// Resolve lookups for one run: a snapshot file when given, else the
/// configured database, else empty lookups.
pub async fn load_lookups(snapshot_path: Option<&Path>) -> Result<LookupSnapshot, StoreError> {
    if let Some(path) = snapshot_path {
        let snapshot = LookupSnapshot::from_file(path)?;
        log_info(format!(
            "Loaded lookup snapshot {} ({} SKUs, {} locations)",
            path.display(),
            snapshot.sku.len(),
            snapshot.locations.len()
        ));
        return Ok(snapshot);
    }

    match PgLookupStore::from_env()? {
        Some(store) => Ok(store.fetch_snapshot().await),
        None => {
            log_info("No lookup store configured, code mapping will be skipped");
            Ok(LookupSnapshot::new())
        }
    }
}

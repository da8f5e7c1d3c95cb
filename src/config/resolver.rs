//! Alias resolution from environment-style configuration.
//!
//! Three precedence tiers per backend prefix `T`:
//! 1. `T_CONNECTIONS` - `alias=url;alias=url;...`, each URL parsed by the
//!    connection-string parser; malformed entries are recorded, not fatal.
//! 2. `T_DB<N>_HOST|PORT|USER|PASSWORD|DATABASE` - probed sequentially from
//!    N=1; the first missing index terminates the scan.
//! 3. `T_HOST|PORT|USER|PASSWORD|DATABASE` - legacy single instance under
//!    alias `default`, applied only when tiers 1-2 produced nothing.
//!
//! The table is rebuilt on every call; nothing is cached, so configuration
//! changes take effect without a restart.

use std::collections::HashMap;

use tracing::debug;

use crate::config::connection_string;
use crate::error::{DbError, DbResult};
use crate::models::{AliasTable, BackendType, ConnectionConfig};

/// Where the resolver reads variables from. Tests inject a static map so
/// they never touch (or race on) the process environment.
#[derive(Debug, Clone)]
enum VarSource {
    Process,
    Static(HashMap<String, String>),
}

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    source: VarSource,
}

impl ConfigResolver {
    /// Resolver backed by the process environment.
    pub fn from_env() -> Self {
        Self {
            source: VarSource::Process,
        }
    }

    /// Resolver backed by a fixed variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self {
            source: VarSource::Static(vars),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        let value = match &self.source {
            VarSource::Process => std::env::var(key).ok(),
            VarSource::Static(vars) => vars.get(key).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Build the alias table for one backend from the current configuration.
    ///
    /// Partial failures accumulate inside the table; the call itself fails
    /// only when zero aliases resolved AND at least one entry was configured
    /// wrong, to distinguish "nothing configured" from "something configured
    /// wrong".
    pub fn resolve(&self, backend: BackendType) -> DbResult<AliasTable> {
        let mut table = AliasTable::new(backend);

        self.collect_connection_list(backend, &mut table);
        self.collect_numbered(backend, &mut table);
        if table.is_empty() {
            self.collect_legacy(backend, &mut table);
        }

        debug!(
            backend = %backend,
            aliases = table.len(),
            errors = table.errors().len(),
            "resolved alias table"
        );

        if table.is_empty() && table.has_errors() {
            return Err(DbError::config(format!(
                "no usable {} connection configured: {}",
                backend,
                table.errors().join("; ")
            )));
        }
        Ok(table)
    }

    /// Tier 1: the `T_CONNECTIONS` multi-entry list.
    fn collect_connection_list(&self, backend: BackendType, table: &mut AliasTable) {
        let Some(list) = self.var(&format!("{}_CONNECTIONS", backend.env_prefix())) else {
            return;
        };

        for entry in list.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((alias, url)) = entry.split_once('=') else {
                table.record_error(format!(
                    "connection list entry '{}' is not of the form alias=url",
                    entry
                ));
                continue;
            };
            let alias = alias.trim();
            if alias.is_empty() {
                table.record_error(format!("connection list entry '{}' has an empty alias", entry));
                continue;
            }
            match connection_string::parse(url, backend) {
                Ok(config) => table.insert(alias, config),
                Err(e) => table.record_error(format!("alias '{}': {}", alias, e)),
            }
        }
    }

    /// Tier 2: numbered instance variables. A gap terminates the scan;
    /// `T_DB3_HOST` is never reached when `T_DB2_HOST` is absent.
    fn collect_numbered(&self, backend: BackendType, table: &mut AliasTable) {
        let prefix = backend.env_prefix();
        for n in 1u32.. {
            let Some(host) = self.var(&format!("{}_DB{}_HOST", prefix, n)) else {
                break;
            };
            let alias = format!("db{}", n);
            match self.config_from_parts(backend, host, &format!("{}_DB{}", prefix, n)) {
                Ok(config) => table.insert(alias, config),
                Err(e) => table.record_error(format!("alias '{}': {}", alias, e)),
            }
        }
    }

    /// Tier 3: the unnumbered legacy variables, alias `default`.
    fn collect_legacy(&self, backend: BackendType, table: &mut AliasTable) {
        let prefix = backend.env_prefix();
        let Some(host) = self.var(&format!("{}_HOST", prefix)) else {
            return;
        };
        match self.config_from_parts(backend, host, prefix) {
            Ok(config) => table.insert("default", config),
            Err(e) => table.record_error(format!("alias 'default': {}", e)),
        }
    }

    /// Assemble a config from `<base>_PORT|USER|PASSWORD|DATABASE` around an
    /// already-present host.
    fn config_from_parts(
        &self,
        backend: BackendType,
        host: String,
        base: &str,
    ) -> DbResult<ConnectionConfig> {
        let mut config = ConnectionConfig::new(backend, host);
        if let Some(port) = self.var(&format!("{}_PORT", base)) {
            let parsed: u16 = port
                .parse()
                .map_err(|_| DbError::config(format!("invalid port '{}'", port)))?;
            if parsed == 0 {
                return Err(DbError::config("port must be between 1 and 65535"));
            }
            config.port = Some(parsed);
        }
        config.user = self.var(&format!("{}_USER", base));
        config.password = self.var(&format!("{}_PASSWORD", base));
        config.database = self.var(&format!("{}_DATABASE", base));
        config.apply_backend_defaults();
        config.validate()?;
        Ok(config)
    }
}

//! Canonical fact store backed by SQLite
//!
//! Tables are created lazily and idempotently on first write, so a store
//! built from an older or partial bundle simply lacks the tables it never
//! needed. Readers probe with [`FactStore::probe`] before querying.

use crate::error::StoreError;
use crate::fact::{
    ClusterMetadataFact, ConfigFact, FactSource, FactTable, FeatureFact, NamespaceMetricFact,
    NodeMetricFact, SecurityConnectionFact, SetMetricFact, SystemInfoFact,
};
use crate::run_context::RunContext;
use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of a schema-safety probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Ready,
    MissingTable(&'static str),
    MissingColumn {
        table: &'static str,
        column: String,
    },
}

impl Probe {
    pub fn is_ready(&self) -> bool {
        matches!(self, Probe::Ready)
    }
}

pub struct FactStore {
    conn: Connection,
}

impl FactStore {
    /// Create an empty store at `path`, replacing whatever was there
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Self::open(path)
    }

    /// Open (or create) a store for writing
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open an existing store for rule evaluation
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    fn ensure(&self, table: FactTable) -> Result<(), StoreError> {
        self.conn.execute_batch(table.ddl())?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------------

    /// Run `f` inside a transaction, committing on `Ok`
    pub fn in_transaction<T, E>(&self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| E::from(StoreError::from(e)))?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| E::from(StoreError::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!("Rollback failed: {}", rollback);
                }
                Err(err)
            }
        }
    }

    /// Run `f` inside a savepoint; its writes are discarded if it fails
    pub fn isolated<T, E>(&self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.conn
            .execute_batch("SAVEPOINT isolated_write")
            .map_err(|e| E::from(StoreError::from(e)))?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("RELEASE isolated_write")
                    .map_err(|e| E::from(StoreError::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO isolated_write; RELEASE isolated_write")
                {
                    tracing::warn!("Savepoint rollback failed: {}", rollback);
                }
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Schema probe
    // ------------------------------------------------------------------------

    pub fn has_table(&self, table: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        Ok(stmt.exists(params![table])?)
    }

    pub fn has_column(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")?;
        Ok(stmt.exists(params![table, column])?)
    }

    /// Does `table` exist with every one of `columns`?
    pub fn probe(&self, table: FactTable, columns: &[&str]) -> Result<Probe, StoreError> {
        if !self.has_table(table.name())? {
            return Ok(Probe::MissingTable(table.name()));
        }
        for column in columns {
            if !self.has_column(table.name(), column)? {
                return Ok(Probe::MissingColumn {
                    table: table.name(),
                    column: column.to_string(),
                });
            }
        }
        Ok(Probe::Ready)
    }

    pub fn row_count(&self, table: FactTable) -> Result<usize, StoreError> {
        if !self.has_table(table.name())? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Every row of `table` as column -> text, in a stable order
    pub fn table_rows(&self, table: FactTable) -> Result<Vec<BTreeMap<String, String>>, StoreError> {
        if !self.has_table(table.name())? {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT * FROM {}", table.name());
        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = BTreeMap::new();
            for (i, name) in names.iter().enumerate() {
                let text = match row.get_ref(i)? {
                    ValueRef::Null => String::new(),
                    ValueRef::Integer(n) => n.to_string(),
                    ValueRef::Real(f) => f.to_string(),
                    ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
                };
                record.insert(name.clone(), text);
            }
            out.push(record);
        }
        out.sort();
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Run context
    // ------------------------------------------------------------------------

    pub fn begin_run(&self, run: &RunContext) -> Result<(), StoreError> {
        self.ensure(FactTable::RunContext)?;
        self.conn.execute(
            "INSERT INTO run_context (run_id, source_bundle_path, discovered_at) VALUES (?1, ?2, ?3)",
            params![
                run.run_id(),
                run.source_bundle_path().to_string_lossy(),
                run.discovered_at().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Most recently recorded run, if any
    pub fn latest_run(&self) -> Result<Option<RunContext>, StoreError> {
        if !self.has_table(FactTable::RunContext.name())? {
            return Ok(None);
        }
        let mut stmt = self.conn.prepare(
            "SELECT run_id, source_bundle_path, discovered_at FROM run_context
             ORDER BY rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let run_id: String = row.get(0)?;
        let path: String = row.get(1)?;
        let discovered_at: String = row.get(2)?;
        let discovered_at = DateTime::parse_from_rfc3339(&discovered_at)
            .map_err(|_| StoreError::InvalidValue {
                table: "run_context",
                column: "discovered_at",
                value: discovered_at.clone(),
            })?
            .with_timezone(&Utc);
        Ok(Some(RunContext::from_parts(run_id, path, discovered_at)))
    }

    // ------------------------------------------------------------------------
    // Writers
    // ------------------------------------------------------------------------

    pub fn insert_node_metrics(
        &self,
        run: &RunContext,
        facts: &[NodeMetricFact],
    ) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(FactTable::NodeMetrics)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO node_metrics (run_id, node_id, metric_key, value, source)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for fact in facts {
            stmt.execute(params![
                run.run_id(),
                fact.node_id,
                fact.metric_key,
                fact.value,
                fact.source.as_str()
            ])?;
        }
        Ok(facts.len())
    }

    pub fn insert_namespace_metrics(
        &self,
        run: &RunContext,
        facts: &[NamespaceMetricFact],
    ) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(FactTable::NamespaceMetrics)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO namespace_metrics (run_id, node_id, namespace, metric_key, value, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for fact in facts {
            stmt.execute(params![
                run.run_id(),
                fact.node_id,
                fact.namespace,
                fact.metric_key,
                fact.value,
                fact.source.as_str()
            ])?;
        }
        Ok(facts.len())
    }

    /// Set telemetry is a snapshot: a repeated key replaces the earlier value
    pub fn upsert_set_metrics(
        &self,
        run: &RunContext,
        facts: &[SetMetricFact],
    ) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(FactTable::SetMetrics)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO set_metrics (run_id, node_id, namespace, set_name, key, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for fact in facts {
            stmt.execute(params![
                run.run_id(),
                fact.node_id,
                fact.namespace,
                fact.set_name,
                fact.key,
                fact.value
            ])?;
        }
        Ok(facts.len())
    }

    pub fn insert_node_configs(
        &self,
        run: &RunContext,
        facts: &[ConfigFact],
    ) -> Result<usize, StoreError> {
        self.insert_configs(FactTable::NodeConfigs, run, facts)
    }

    pub fn insert_static_configs(
        &self,
        run: &RunContext,
        facts: &[ConfigFact],
    ) -> Result<usize, StoreError> {
        self.insert_configs(FactTable::StaticConfigs, run, facts)
    }

    fn insert_configs(
        &self,
        table: FactTable,
        run: &RunContext,
        facts: &[ConfigFact],
    ) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(table)?;
        let sql = format!(
            "INSERT INTO {} (run_id, node_id, config_name, value, source) VALUES (?1, ?2, ?3, ?4, ?5)",
            table.name()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        for fact in facts {
            stmt.execute(params![
                run.run_id(),
                fact.node_id,
                fact.config_name,
                fact.value,
                fact.source.as_str()
            ])?;
        }
        Ok(facts.len())
    }

    pub fn insert_features(
        &self,
        run: &RunContext,
        facts: &[FeatureFact],
    ) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(FactTable::ActiveFeatures)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO active_features (run_id, node_id, feature_name) VALUES (?1, ?2, ?3)",
        )?;
        for fact in facts {
            stmt.execute(params![run.run_id(), fact.node_id, fact.feature_name])?;
        }
        Ok(facts.len())
    }

    /// Cluster-wide keys are global; later writes replace earlier ones
    pub fn put_cluster_metadata(&self, facts: &[ClusterMetadataFact]) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(FactTable::ClusterMetadata)?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR REPLACE INTO cluster_metadata (key, value) VALUES (?1, ?2)")?;
        for fact in facts {
            stmt.execute(params![fact.key, fact.value])?;
        }
        Ok(facts.len())
    }

    pub fn upsert_security_connections(
        &self,
        run: &RunContext,
        facts: &[SecurityConnectionFact],
    ) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(FactTable::SecurityConnections)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO security_connections (node_id, user, connection_count, run_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for fact in facts {
            stmt.execute(params![
                fact.node_id,
                fact.user,
                fact.connection_count,
                run.run_id()
            ])?;
        }
        Ok(facts.len())
    }

    pub fn insert_system_info(
        &self,
        run: &RunContext,
        facts: &[SystemInfoFact],
    ) -> Result<usize, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        self.ensure(FactTable::SystemInfo)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO system_info (run_id, node_id, metric, value) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for fact in facts {
            stmt.execute(params![run.run_id(), fact.node_id, fact.metric, fact.value])?;
        }
        Ok(facts.len())
    }

    // ------------------------------------------------------------------------
    // Readers
    //
    // These do not probe: querying a table that does not exist surfaces the
    // SQLite "no such table" error to the caller.
    //
    // Every per-run table is read through the current run only, so a store
    // that has seen several ingestions answers for the last one. `?1` is the
    // run id (NULL when no run was ever recorded, which disables the filter);
    // caller arguments start at `?2`.
    // ------------------------------------------------------------------------

    /// Id of the run readers are scoped to: the last one recorded
    pub fn current_run_id(&self) -> Result<Option<String>, StoreError> {
        if !self.has_table(FactTable::RunContext.name())? {
            return Ok(None);
        }
        let ids = self.collect(
            "SELECT run_id FROM run_context ORDER BY rowid DESC LIMIT 1",
            &[],
            |row| row.get::<_, String>(0),
        )?;
        Ok(ids.into_iter().next())
    }

    /// Node metrics whose key is one of `keys`
    pub fn node_metrics(&self, keys: &[&str]) -> Result<Vec<NodeMetricFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, metric_key, value, source FROM node_metrics
             WHERE {} AND metric_key IN ({}) ORDER BY node_id, metric_key",
            RUN_SCOPE,
            placeholders(keys.len())
        );
        self.collect_in_run(&sql, keys, node_metric_row)
    }

    /// Node metrics for one node
    pub fn node_metrics_for(&self, node_id: &str) -> Result<Vec<NodeMetricFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, metric_key, value, source FROM node_metrics
             WHERE {} AND node_id = ?2 ORDER BY metric_key",
            RUN_SCOPE
        );
        self.collect_in_run(&sql, &[node_id], node_metric_row)
    }

    /// Namespace metrics whose key is one of `keys`
    pub fn namespace_metrics(&self, keys: &[&str]) -> Result<Vec<NamespaceMetricFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, namespace, metric_key, value, source FROM namespace_metrics
             WHERE {} AND metric_key IN ({}) ORDER BY node_id, namespace, metric_key",
            RUN_SCOPE,
            placeholders(keys.len())
        );
        self.collect_in_run(&sql, keys, namespace_row)
    }

    /// Namespace metrics for one node
    pub fn namespace_metrics_for(
        &self,
        node_id: &str,
    ) -> Result<Vec<NamespaceMetricFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, namespace, metric_key, value, source FROM namespace_metrics
             WHERE {} AND node_id = ?2 ORDER BY namespace, metric_key",
            RUN_SCOPE
        );
        self.collect_in_run(&sql, &[node_id], namespace_row)
    }

    pub fn node_configs(&self) -> Result<Vec<ConfigFact>, StoreError> {
        self.configs(FactTable::NodeConfigs, None)
    }

    pub fn node_configs_for(&self, node_id: &str) -> Result<Vec<ConfigFact>, StoreError> {
        self.configs(FactTable::NodeConfigs, Some(node_id))
    }

    pub fn static_configs(&self) -> Result<Vec<ConfigFact>, StoreError> {
        self.configs(FactTable::StaticConfigs, None)
    }

    fn configs(
        &self,
        table: FactTable,
        node_id: Option<&str>,
    ) -> Result<Vec<ConfigFact>, StoreError> {
        match node_id {
            Some(node) => {
                let sql = format!(
                    "SELECT node_id, config_name, value, source FROM {}
                     WHERE {} AND node_id = ?2 ORDER BY config_name",
                    table.name(),
                    RUN_SCOPE
                );
                self.collect_in_run(&sql, &[node], config_row)
            }
            None => {
                let sql = format!(
                    "SELECT node_id, config_name, value, source FROM {}
                     WHERE {} ORDER BY node_id, config_name",
                    table.name(),
                    RUN_SCOPE
                );
                self.collect_in_run(&sql, &[], config_row)
            }
        }
    }

    pub fn set_metrics(&self, key: &str) -> Result<Vec<SetMetricFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, namespace, set_name, key, value FROM set_metrics
             WHERE {} AND key = ?2 ORDER BY namespace, set_name, node_id",
            RUN_SCOPE
        );
        self.collect_in_run(&sql, &[key], |row| {
            Ok(SetMetricFact {
                node_id: row.get(0)?,
                namespace: row.get(1)?,
                set_name: row.get(2)?,
                key: row.get(3)?,
                value: row.get(4)?,
            })
        })
    }

    pub fn features(&self) -> Result<Vec<FeatureFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, feature_name FROM active_features
             WHERE {} ORDER BY node_id, feature_name",
            RUN_SCOPE
        );
        self.collect_in_run(&sql, &[], |row| {
            Ok(FeatureFact {
                node_id: row.get(0)?,
                feature_name: row.get(1)?,
            })
        })
    }

    /// Cluster metadata is global: one value per key, last write wins
    pub fn cluster_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.collect(
            "SELECT value FROM cluster_metadata WHERE key = ?1",
            &[key],
            |row| row.get::<_, String>(0),
        )?;
        Ok(values.into_iter().next())
    }

    pub fn all_cluster_metadata(&self) -> Result<Vec<ClusterMetadataFact>, StoreError> {
        self.collect(
            "SELECT key, value FROM cluster_metadata ORDER BY key",
            &[],
            |row| {
                Ok(ClusterMetadataFact {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            },
        )
    }

    pub fn security_connections(&self) -> Result<Vec<SecurityConnectionFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, user, connection_count FROM security_connections
             WHERE {} ORDER BY node_id, user",
            RUN_SCOPE
        );
        self.collect_in_run(&sql, &[], |row| {
            Ok(SecurityConnectionFact {
                node_id: row.get(0)?,
                user: row.get(1)?,
                connection_count: row.get(2)?,
            })
        })
    }

    pub fn system_info(&self) -> Result<Vec<SystemInfoFact>, StoreError> {
        let sql = format!(
            "SELECT node_id, metric, value FROM system_info
             WHERE {} ORDER BY node_id, metric",
            RUN_SCOPE
        );
        self.collect_in_run(&sql, &[], |row| {
            Ok(SystemInfoFact {
                node_id: row.get(0)?,
                metric: row.get(1)?,
                value: row.get(2)?,
            })
        })
    }

    fn collect<T>(
        &self,
        sql: &str,
        args: &[&str],
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// [`Self::collect`] with the current run id bound as `?1`
    fn collect_in_run<T>(
        &self,
        sql: &str,
        args: &[&str],
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let run = match self.current_run_id()? {
            Some(id) => SqlValue::Text(id),
            None => SqlValue::Null,
        };
        let bound = std::iter::once(run).chain(args.iter().map(|a| SqlValue::Text(a.to_string())));
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(bound), map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Restricts a per-run table to the run bound as `?1`
const RUN_SCOPE: &str = "(?1 IS NULL OR run_id = ?1)";

fn node_metric_row(row: &Row<'_>) -> rusqlite::Result<NodeMetricFact> {
    Ok(NodeMetricFact {
        node_id: row.get(0)?,
        metric_key: row.get(1)?,
        value: row.get(2)?,
        source: source_column(row, 3)?,
    })
}

fn namespace_row(row: &Row<'_>) -> rusqlite::Result<NamespaceMetricFact> {
    Ok(NamespaceMetricFact {
        node_id: row.get(0)?,
        namespace: row.get(1)?,
        metric_key: row.get(2)?,
        value: row.get(3)?,
        source: source_column(row, 4)?,
    })
}

fn config_row(row: &Row<'_>) -> rusqlite::Result<ConfigFact> {
    Ok(ConfigFact {
        node_id: row.get(0)?,
        config_name: row.get(1)?,
        value: row.get(2)?,
        source: source_column(row, 3)?,
    })
}

fn source_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<FactSource> {
    let tag: String = row.get(idx)?;
    FactSource::parse(&tag).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown fact source tag: {}", tag).into(),
        )
    })
}

/// `?2, ?3, ...` for an IN list after the run scope; an empty list matches
/// nothing
fn placeholders(n: usize) -> String {
    if n == 0 {
        return "NULL".to_string();
    }
    (2..=n + 1)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunContext {
        RunContext::new("test.tgz")
    }

    fn metric(node: &str, key: &str, value: &str) -> NodeMetricFact {
        NodeMetricFact {
            node_id: node.to_string(),
            metric_key: key.to_string(),
            value: value.to_string(),
            source: FactSource::Statistic,
        }
    }

    #[test]
    fn test_fresh_store_has_no_fact_tables() {
        let store = FactStore::open_in_memory().unwrap();
        for table in FactTable::ALL {
            assert!(!store.has_table(table.name()).unwrap());
        }
        assert_eq!(
            store.probe(FactTable::NodeMetrics, &["value"]).unwrap(),
            Probe::MissingTable("node_metrics")
        );
    }

    #[test]
    fn test_probe_detects_missing_column() {
        let store = FactStore::open_in_memory().unwrap();
        store
            .insert_node_metrics(&run(), &[metric("n1", "service.objects", "5")])
            .unwrap();

        assert!(store
            .probe(FactTable::NodeMetrics, &["node_id", "metric_key", "value"])
            .unwrap()
            .is_ready());
        assert_eq!(
            store.probe(FactTable::NodeMetrics, &["namespace"]).unwrap(),
            Probe::MissingColumn {
                table: "node_metrics",
                column: "namespace".to_string()
            }
        );
    }

    #[test]
    fn test_node_metric_filter_by_keys() {
        let store = FactStore::open_in_memory().unwrap();
        let r = run();
        store
            .insert_node_metrics(
                &r,
                &[
                    metric("n1", "service.client_proxy_error", "10"),
                    metric("n2", "service.client_proxy_error", "250"),
                    metric("n1", "service.uptime", "99"),
                ],
            )
            .unwrap();

        let rows = store.node_metrics(&["service.client_proxy_error"]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].node_id, "n2");
        assert!(store.node_metrics(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_set_metrics_upsert_replaces() {
        let store = FactStore::open_in_memory().unwrap();
        let r = run();
        let fact = |value: &str| SetMetricFact {
            node_id: "n1".to_string(),
            namespace: "test".to_string(),
            set_name: "users".to_string(),
            key: "objects".to_string(),
            value: value.to_string(),
        };
        store.upsert_set_metrics(&r, &[fact("100")]).unwrap();
        store.upsert_set_metrics(&r, &[fact("120")]).unwrap();

        let rows = store.set_metrics("objects").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, "120");
    }

    #[test]
    fn test_cluster_metadata_last_write_wins() {
        let store = FactStore::open_in_memory().unwrap();
        let put = |v: &str| {
            store
                .put_cluster_metadata(&[ClusterMetadataFact {
                    key: "cloud_platform".to_string(),
                    value: v.to_string(),
                }])
                .unwrap()
        };
        put("AWS");
        put("Azure");
        assert_eq!(
            store.cluster_metadata("cloud_platform").unwrap().as_deref(),
            Some("Azure")
        );
        assert_eq!(store.cluster_metadata("topology").unwrap(), None);
    }

    #[test]
    fn test_missing_table_read_is_an_error() {
        let store = FactStore::open_in_memory().unwrap();
        let err = store.static_configs().unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_isolated_write_rolls_back_on_error() {
        let store = FactStore::open_in_memory().unwrap();
        let r = run();
        let result: Result<(), StoreError> = store.isolated(|s| {
            s.insert_node_metrics(&r, &[metric("n1", "service.objects", "1")])?;
            Err(StoreError::InvalidValue {
                table: "node_metrics",
                column: "value",
                value: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store.row_count(FactTable::NodeMetrics).unwrap(), 0);
    }

    #[test]
    fn test_run_context_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.db");
        let r = run();
        {
            let store = FactStore::create(&path).unwrap();
            store.begin_run(&r).unwrap();
        }
        let store = FactStore::open_read_only(&path).unwrap();
        let latest = store.latest_run().unwrap().unwrap();
        assert_eq!(latest.run_id(), r.run_id());
    }

    #[test]
    fn test_readers_see_only_the_latest_run() {
        let store = FactStore::open_in_memory().unwrap();
        let first = run();
        let second = run();

        store.begin_run(&first).unwrap();
        store
            .insert_node_metrics(&first, &[metric("n1", "service.client_proxy_error", "10")])
            .unwrap();
        store.begin_run(&second).unwrap();
        store
            .insert_node_metrics(&second, &[metric("n1", "service.client_proxy_error", "12")])
            .unwrap();

        assert_eq!(store.current_run_id().unwrap().as_deref(), Some(second.run_id()));
        let rows = store.node_metrics(&["service.client_proxy_error"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, "12");
        assert_eq!(store.node_metrics_for("n1").unwrap().len(), 1);
        // History is kept on disk
        assert_eq!(store.row_count(FactTable::NodeMetrics).unwrap(), 2);
    }

    #[test]
    fn test_create_replaces_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.db");
        {
            let store = FactStore::create(&path).unwrap();
            store
                .insert_node_metrics(&run(), &[metric("n1", "service.objects", "1")])
                .unwrap();
        }
        let store = FactStore::create(&path).unwrap();
        assert!(!store.has_table("node_metrics").unwrap());
    }
}

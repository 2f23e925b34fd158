//! Migration runner - drives loaded units against one provider.
//!
//! A run compares the loaded migrations with the ledger, picks a direction and
//! the versions to execute, then applies (or reverts) them one by one. On
//! engines with transactional DDL the whole run is a single transaction. On the
//! others each unit's DDL commits as it goes and only its ledger write is
//! transactional, so a failure can leave earlier units committed.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{MigrateError, Result};
use crate::loader::{Migration, MigrationLoader};
use crate::provider::TransformationProvider;

/// Which way a run moves the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Version a run should end at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationTarget {
    /// Highest loaded version.
    #[default]
    Latest,
    /// Revert everything.
    Zero,
    Version(i64),
}

impl std::str::FromStr for MigrationTarget {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(MigrationTarget::Latest),
            "zero" | "0" => Ok(MigrationTarget::Zero),
            other => other.parse::<i64>().map(MigrationTarget::Version).map_err(|_| {
                MigrateError::Config(format!(
                    "invalid migration target '{}': expected 'latest', 'zero' or a version",
                    s
                ))
            }),
        }
    }
}

/// Lifecycle of a [`Migrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { direction: Direction, target: i64 },
    Committed,
    RolledBack,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub direction: Direction,

    /// Versions applied, in execution order.
    pub applied: Vec<i64>,

    /// Versions reverted, in execution order.
    pub reverted: Vec<i64>,

    /// Highest applied version before the run (0 for an empty ledger).
    pub from_version: i64,

    /// Highest applied version after the run.
    pub to_version: i64,

    /// The plan was computed but nothing was executed.
    pub dry_run: bool,

    pub started_at: DateTime<Utc>,

    pub duration_seconds: f64,
}

impl MigrationReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Applied and pending versions, as reported by [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub current_version: i64,
    pub applied: Vec<i64>,
    pub pending: Vec<i64>,
}

impl MigrationStatus {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs migrations from a [`MigrationLoader`] through a [`TransformationProvider`].
pub struct Migrator {
    provider: TransformationProvider,
    loader: MigrationLoader,
    transactional_ddl: bool,
    dry_run: bool,
    cancel: Option<CancellationToken>,
    state: RunState,
}

impl Migrator {
    pub fn new(provider: TransformationProvider, loader: MigrationLoader) -> Self {
        Self {
            provider,
            loader,
            transactional_ddl: true,
            dry_run: false,
            cancel: None,
            state: RunState::Idle,
        }
    }

    /// Wrap the run in one transaction when the engine allows it. Turning this
    /// off forces per-unit commits even on transactional engines.
    pub fn transactional_ddl(mut self, enabled: bool) -> Self {
        self.transactional_ddl = enabled;
        self
    }

    /// Report the plan without executing anything.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Abort the run when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn provider(&self) -> &TransformationProvider {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut TransformationProvider {
        &mut self.provider
    }

    pub fn loader(&self) -> &MigrationLoader {
        &self.loader
    }

    /// Give the provider back, e.g. to close it.
    pub fn into_provider(self) -> TransformationProvider {
        self.provider
    }

    /// Whether this run will use a single transaction.
    pub fn is_transactional(&self) -> bool {
        self.transactional_ddl && self.provider.dialect().supports_transactional_ddl()
    }

    pub async fn migrate_to_latest(&mut self) -> Result<MigrationReport> {
        self.migrate_to(MigrationTarget::Latest).await
    }

    /// Move the schema to `target`, applying or reverting as needed.
    pub async fn migrate_to(&mut self, target: MigrationTarget) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let loaded = self.loader.load()?;
        let applied = read_applied(&mut self.provider).await?;
        let current = applied.iter().copied().max().unwrap_or(0);
        let target = match target {
            MigrationTarget::Latest => loaded.iter().map(|m| m.version()).max().unwrap_or(0),
            MigrationTarget::Zero => 0,
            MigrationTarget::Version(v) => v,
        };

        let direction = if target >= current {
            Direction::Up
        } else {
            Direction::Down
        };
        let plan = plan_units(&loaded, &applied, current, target, direction)?;

        let to_version = match direction {
            Direction::Up => plan.last().map(|m| m.version()).unwrap_or(current),
            Direction::Down => applied
                .iter()
                .copied()
                .filter(|v| *v <= target)
                .max()
                .unwrap_or(0),
        };
        let versions: Vec<i64> = plan.iter().map(|m| m.version()).collect();

        info!(
            "Migrating {} from version {} to {} ({} migrations)",
            direction,
            current,
            to_version,
            versions.len()
        );

        if !self.dry_run && !plan.is_empty() {
            let transactional = self.is_transactional();
            if !transactional {
                warn!(
                    "{} runs without transactional DDL; completed migrations commit individually",
                    self.provider.dialect().name()
                );
            }
            self.state = RunState::Running { direction, target };
            let outcome = if transactional {
                run_transactional(&mut self.provider, &plan, direction, self.cancel.as_ref()).await
            } else {
                run_per_unit(&mut self.provider, &plan, direction, self.cancel.as_ref()).await
            };
            match outcome {
                Ok(()) => self.state = RunState::Committed,
                Err(e) => {
                    self.state = RunState::RolledBack;
                    error!("{}", e);
                    return Err(e);
                }
            }
        } else if self.dry_run {
            info!("Dry run: {:?} not executed", versions);
        }

        let (applied, reverted) = match direction {
            Direction::Up => (versions, Vec::new()),
            Direction::Down => (Vec::new(), versions),
        };
        Ok(MigrationReport {
            direction,
            applied,
            reverted,
            from_version: current,
            to_version,
            dry_run: self.dry_run,
            started_at,
            duration_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Compare the ledger with the loaded migrations. Never writes; an empty
    /// loader simply has nothing pending.
    pub async fn status(&mut self) -> Result<MigrationStatus> {
        let loaded = if self.loader.is_empty() {
            Vec::new()
        } else {
            self.loader.load()?
        };
        let applied = read_applied(&mut self.provider).await?;
        let recorded: HashSet<i64> = applied.iter().copied().collect();
        let pending = loaded
            .iter()
            .map(|m| m.version())
            .filter(|v| !recorded.contains(v))
            .collect();
        Ok(MigrationStatus {
            current_version: applied.iter().copied().max().unwrap_or(0),
            applied,
            pending,
        })
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("provider", &self.provider)
            .field("loader", &self.loader)
            .field("transactional_ddl", &self.transactional_ddl)
            .field("dry_run", &self.dry_run)
            .field("state", &self.state)
            .finish()
    }
}

/// Ledger contents without creating the ledger table.
async fn read_applied(provider: &mut TransformationProvider) -> Result<Vec<i64>> {
    let ledger = provider.ledger_table().to_string();
    if !provider.table_exists(&ledger).await? {
        return Ok(Vec::new());
    }
    provider.applied_migrations().await
}

/// Units to execute, in execution order.
fn plan_units<'m>(
    loaded: &[&'m dyn Migration],
    applied: &[i64],
    current: i64,
    target: i64,
    direction: Direction,
) -> Result<Vec<&'m dyn Migration>> {
    match direction {
        Direction::Up => Ok(loaded
            .iter()
            .copied()
            .filter(|m| m.version() > current && m.version() <= target)
            .collect()),
        Direction::Down => {
            let mut versions: Vec<i64> = applied.iter().copied().filter(|v| *v > target).collect();
            versions.sort_unstable_by(|a, b| b.cmp(a));
            versions.dedup();
            versions
                .into_iter()
                .map(|v| {
                    loaded.iter().copied().find(|m| m.version() == v).ok_or_else(|| {
                        MigrateError::Loader(format!(
                            "Version {} is recorded as applied but no migration with that version is loaded",
                            v
                        ))
                    })
                })
                .collect()
        }
    }
}

/// Run the unit's up or down step, racing cancellation.
async fn run_unit(
    provider: &mut TransformationProvider,
    unit: &dyn Migration,
    direction: Direction,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    let step = async {
        match direction {
            Direction::Up => unit.up(provider).await,
            Direction::Down => unit.down(provider).await,
        }
    };
    match cancel {
        Some(token) => {
            if token.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            tokio::select! {
                result = step => result,
                _ = token.cancelled() => Err(MigrateError::Cancelled),
            }
        }
        None => step.await,
    }
}

async fn record(
    provider: &mut TransformationProvider,
    version: i64,
    direction: Direction,
) -> Result<()> {
    match direction {
        Direction::Up => provider.migration_applied(version).await,
        Direction::Down => provider.migration_unapplied(version).await,
    }
}

fn log_done(unit: &dyn Migration, direction: Direction) {
    match direction {
        Direction::Up => info!("Applied migration {} ({})", unit.version(), unit.name()),
        Direction::Down => info!("Reverted migration {} ({})", unit.version(), unit.name()),
    }
}

async fn rollback_quietly(provider: &mut TransformationProvider) {
    if let Err(e) = provider.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}

/// Attach the failing version. Cancellation stays [`MigrateError::Cancelled`]
/// unless earlier units are already committed.
fn unit_failure(version: i64, last_committed: Option<i64>, error: MigrateError) -> MigrateError {
    match (last_committed, error) {
        (Some(last_committed), error) => MigrateError::PartialMigration {
            version,
            last_committed,
            source: Box::new(error),
        },
        (None, MigrateError::Cancelled) => MigrateError::Cancelled,
        (None, error) => MigrateError::MigrationFailed {
            version,
            source: Box::new(error),
        },
    }
}

/// All units and ledger writes in one transaction.
async fn run_transactional(
    provider: &mut TransformationProvider,
    plan: &[&dyn Migration],
    direction: Direction,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    provider.begin_transaction().await?;
    for unit in plan {
        let version = unit.version();
        debug!("Running migration {} {}", version, direction);
        let result = match run_unit(provider, *unit, direction, cancel).await {
            Ok(()) => record(provider, version, direction).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            rollback_quietly(provider).await;
            return Err(unit_failure(version, None, e));
        }
        log_done(*unit, direction);
    }
    provider.commit().await
}

/// Units auto-commit; each ledger write gets its own transaction.
async fn run_per_unit(
    provider: &mut TransformationProvider,
    plan: &[&dyn Migration],
    direction: Direction,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    let mut last_committed = None;
    for unit in plan {
        let version = unit.version();
        debug!("Running migration {} {}", version, direction);
        let result = async {
            run_unit(provider, *unit, direction, cancel).await?;
            provider.begin_transaction().await?;
            record(provider, version, direction).await?;
            provider.commit().await
        }
        .await;

        if let Err(e) = result {
            rollback_quietly(provider).await;
            return Err(unit_failure(version, last_committed, e));
        }
        log_done(*unit, direction);
        last_committed = Some(version);
    }
    Ok(())
}

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::client::ApiClient;
use crate::diff::{diff, DiffOptions};
use crate::error::MigrateError;
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::types::{Change, MigrationResult, MigratorAction, NewZone, Zone, ZoneKind, ZoneName};

/// Configuration shared by every zone a single [`Migrator`] runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigratorOptions {
    pub recreate: bool,
    pub dry_run: bool,
    pub sanitize: SanitizeOptions,
    pub diff: DiffOptions,
}

/// Orchestrates one zone's fetch -> sanitize -> probe -> decide -> execute
/// pipeline. Holds its own clones of the source/target clients (cheap:
/// `ApiClient` wraps an `Arc`-backed `reqwest::Client`) so a `Migrator` can
/// be handed to a spawned task without borrowing across an `.await` boundary
/// shared with other zones.
pub struct Migrator {
    source: ApiClient,
    target: ApiClient,
    opts: MigratorOptions,
}

impl Migrator {
    pub fn new(source: ApiClient, target: ApiClient, opts: MigratorOptions) -> Self {
        Migrator { source, target, opts }
    }

    #[instrument(skip(self, cancel), fields(zone = %zone))]
    pub async fn run(
        &self,
        zone: &ZoneName,
        cancel: &CancellationToken,
    ) -> Result<MigrationResult, MigrateError> {
        // FETCH_SOURCE
        let raw_source = self.source.get_zone(zone.as_str(), cancel).await?;

        // SANITIZE
        let sanitized_source = sanitize(raw_source, &self.opts.sanitize)?;

        // PROBE_TARGET
        let exists = self.target.zone_exists(zone.as_str(), cancel).await?;

        if !exists {
            let changes = self.create_zone(&sanitized_source, zone, cancel).await?;
            return Ok(MigrationResult {
                source_zone: zone.to_string(),
                target_zone: zone.to_string(),
                changes,
                action: MigratorAction::CreateZone,
            });
        }

        if self.opts.recreate {
            if !self.opts.dry_run {
                self.target.delete_zone(zone.as_str(), cancel).await?;
            }
            let changes = self.create_zone(&sanitized_source, zone, cancel).await?;
            return Ok(MigrationResult {
                source_zone: zone.to_string(),
                target_zone: zone.to_string(),
                changes,
                action: MigratorAction::RecreateZone,
            });
        }

        // FETCH_TARGET + DIFF
        let raw_target = self.target.get_zone(zone.as_str(), cancel).await?;
        let sanitized_target = sanitize(raw_target, &self.opts.sanitize)?;
        let changes = diff(&sanitized_source.rrsets, &sanitized_target.rrsets, &self.opts.diff);

        if changes.is_empty() {
            info!(action = %MigratorAction::Noop, "zone already in sync");
            return Ok(MigrationResult {
                source_zone: zone.to_string(),
                target_zone: zone.to_string(),
                changes,
                action: MigratorAction::Noop,
            });
        }

        if !self.opts.dry_run {
            self.target
                .patch_rrsets(zone.as_str(), changes.clone(), cancel)
                .await?;
        }

        info!(action = %MigratorAction::PatchZone, changes = changes.len(), "patched zone");
        Ok(MigrationResult {
            source_zone: zone.to_string(),
            target_zone: zone.to_string(),
            changes,
            action: MigratorAction::PatchZone,
        })
    }

    /// Shared by the fresh-create and recreate branches: builds the full
    /// RRSet list as the "changes" for a create, and performs the create
    /// unless this is a dry run.
    async fn create_zone(
        &self,
        sanitized_source: &Zone,
        zone: &ZoneName,
        cancel: &CancellationToken,
    ) -> Result<Vec<Change>, MigrateError> {
        let changes: Vec<Change> = sanitized_source.rrsets.iter().map(Change::replace).collect();

        if !self.opts.dry_run {
            let new_zone = NewZone {
                name: zone.to_string(),
                kind: sanitized_source.kind.unwrap_or(ZoneKind::Native),
                rrsets: sanitized_source.rrsets.clone(),
                nameservers: sanitized_source.nameservers.clone(),
                masters: sanitized_source.masters.clone(),
                account: sanitized_source.account.clone(),
            };
            self.target.create_zone(&new_zone, cancel).await?;
        }

        Ok(changes)
    }
}

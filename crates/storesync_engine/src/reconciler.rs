//! Tax and shipping reconciliation.
//!
//! Tax rules are remote-owned: they are pulled, normalized and merged into
//! the local table by remote tax id, keeping each row's local account.
//! Locally edited name, rate and country can be pushed back row by row.
//!
//! Shipping methods are gathered zone by zone and indexed by title; local
//! shipping rule rows derive their method id from the title they name.

use std::collections::BTreeSet;

use crate::engine::{failed_result, SyncEngine};
use crate::error::{EngineResult, SyncError};
use crate::store::{StoreError, StoreFilter};
use storesync_core::{
    merge_tax_rules, CoreError, Direction, EntityKey, EntityKind, IssueClass, Record,
    ShippingMethod, ShippingMethodMap, SyncIssue, SyncResult, SyncResultBuilder, TaxClass,
    TaxMergeOutcome, TaxRule, TitleIndex, TitleResolution,
};
use storesync_remote::{record_id, ListQuery, RemoteApi};
use tracing::{debug, info, warn};

const TAX_CLASSES: &str = "taxes/classes";
const SHIPPING_ZONES: &str = "shipping/zones";

/// Remote fields sent back by [`Reconciler::push_local_taxes`].
pub const PUSHED_TAX_FIELDS: [&str; 3] = ["name", "rate", "country"];

/// Remote tax rows after normalization.
#[derive(Debug, Clone, Default)]
pub struct RemoteTaxes {
    /// Rows that normalized cleanly.
    pub rules: Vec<TaxRule>,
    /// Rows that were rejected, with the reason.
    pub rejected: Vec<(String, SyncError)>,
}

/// Local tax table: the readable rows and the id of every stored row.
struct LocalTaxes {
    rules: Vec<TaxRule>,
    ids: BTreeSet<String>,
}

/// Tax and shipping reconciliation against one server.
pub struct Reconciler<'a> {
    engine: &'a SyncEngine,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(engine: &'a SyncEngine) -> Self {
        Self { engine }
    }

    fn key(&self, kind: EntityKind, local_id: impl Into<String>) -> EntityKey {
        EntityKey::new(self.engine.server_name(), kind, local_id)
    }

    /// Lists the remote tax classes, or the built-in ones if none are listed.
    pub async fn fetch_remote_tax_classes(&self) -> EngineResult<Vec<TaxClass>> {
        let records = self
            .engine
            .remote
            .list_all(TAX_CLASSES, &ListQuery::new())
            .await?;
        let classes: Vec<TaxClass> = records
            .iter()
            .filter_map(|r| {
                let slug = r.get_str("slug").filter(|s| !s.is_empty())?;
                Some(match r.get_str("name").filter(|s| !s.is_empty()) {
                    Some(name) => TaxClass {
                        slug: slug.to_string(),
                        name: name.to_string(),
                    },
                    None => TaxClass::from_slug(slug),
                })
            })
            .collect();
        if classes.is_empty() {
            debug!(server = %self.engine.server_name(), "no remote tax classes, using defaults");
            return Ok(TaxClass::defaults());
        }
        Ok(classes)
    }

    /// Fetches every remote tax rule, page by page, and normalizes it.
    pub async fn fetch_remote_taxes(&self) -> EngineResult<Vec<TaxRule>> {
        Ok(self.fetch_remote_tax_rows().await?.rules)
    }

    /// Like [`Reconciler::fetch_remote_taxes`], also returning rejected rows.
    pub async fn fetch_remote_tax_rows(&self) -> EngineResult<RemoteTaxes> {
        let records = self
            .engine
            .remote
            .list_all(EntityKind::TaxRule.remote_resource(), &ListQuery::new())
            .await?;
        let mapping = self
            .engine
            .mapper()
            .resolve(EntityKind::TaxRule, Direction::RemoteToLocal);

        let mut out = RemoteTaxes::default();
        for record in records {
            let id = record_id(&record).unwrap_or_default();
            match mapping
                .apply(&record)
                .and_then(|local| TaxRule::from_local_record(&local))
            {
                Ok(rule) => out.rules.push(rule),
                Err(e) => {
                    warn!(server = %self.engine.server_name(), tax_id = %id, error = %e, "remote tax rejected");
                    out.rejected.push((id, e.into()));
                }
            }
        }
        Ok(out)
    }

    /// Reads the local tax table.
    pub async fn load_local_taxes(&self) -> EngineResult<Vec<TaxRule>> {
        Ok(self.load_local_tax_table().await?.rules)
    }

    async fn load_local_tax_table(&self) -> EngineResult<LocalTaxes> {
        let rows = self
            .engine
            .store
            .query(EntityKind::TaxRule, &StoreFilter::all())
            .await?;
        let mut table = LocalTaxes {
            rules: Vec::with_capacity(rows.len()),
            ids: BTreeSet::new(),
        };
        for row in rows {
            table.ids.insert(row.id.clone());
            match TaxRule::from_local_record(&row.fields) {
                Ok(rule) => table.rules.push(rule),
                Err(e) => {
                    warn!(server = %self.engine.server_name(), tax_id = %row.id, error = %e, "local tax row unreadable, keeping its account");
                }
            }
        }
        Ok(table)
    }

    /// Merges remote rows into local rows, keeping local accounts.
    pub fn merge(&self, existing: &[TaxRule], remote: &[TaxRule]) -> TaxMergeOutcome {
        merge_tax_rules(
            existing,
            remote,
            self.engine.server_config().default_tax_account.as_deref(),
        )
    }

    /// Pulls remote taxes into the local table.
    ///
    /// Only inserted and changed rows are written; each write is independent.
    pub async fn sync_taxes(&self) -> SyncResult {
        match self.try_sync_taxes().await {
            Ok(result) => result,
            Err(e) => failed_result(&self.key(EntityKind::TaxRule, "*"), &e),
        }
    }

    async fn try_sync_taxes(&self) -> EngineResult<SyncResult> {
        let remote = self.fetch_remote_tax_rows().await?;
        let existing = self.load_local_tax_table().await?;
        let merged = self.merge(&existing.rules, &remote.rules);

        let mut out = SyncResultBuilder::new();
        for (id, error) in &remote.rejected {
            out.issue(error.to_issue(&self.key(EntityKind::TaxRule, id.clone())));
        }
        let changed: Vec<&TaxRule> = merged
            .rows
            .iter()
            .filter(|r| merged.inserted.contains(&r.id) || merged.updated.contains(&r.id))
            .collect();
        for row in changed {
            let key = self.key(EntityKind::TaxRule, row.local_id());
            let mut record = row.to_local_record();
            // An existing row owns its account even when the rest is unreadable.
            if existing.ids.contains(&key.local_id) {
                record.remove("account");
            }
            match self
                .engine
                .store
                .write(EntityKind::TaxRule, &key.local_id, &record)
                .await
            {
                Ok(()) => {
                    out.write_applied();
                }
                Err(e) => {
                    out.issue(SyncError::from(e).to_issue(&key));
                }
            }
        }
        info!(
            server = %self.engine.server_name(),
            inserted = merged.inserted.len(),
            updated = merged.updated.len(),
            unchanged = merged.unchanged.len(),
            rejected = remote.rejected.len(),
            "taxes reconciled"
        );
        let result = out.build();
        self.engine.shared().history.push(result.clone());
        Ok(result)
    }

    /// Sends locally edited name, rate and country back to the remote store.
    ///
    /// Every row is attempted; the result lists one outcome per row.
    pub async fn push_local_taxes(&self, rows: &[TaxRule]) -> SyncResult {
        let mapping = self
            .engine
            .mapper()
            .resolve(EntityKind::TaxRule, Direction::LocalToRemote);
        let mut batch = SyncResultBuilder::new();
        for row in rows {
            let key = self.key(EntityKind::TaxRule, row.local_id());
            let mut out = SyncResultBuilder::new();
            let pushed = async {
                if row.rate < 0.0 || !row.rate.is_finite() {
                    return Err(SyncError::from(CoreError::validation(
                        "rate",
                        format!("rate {} must not be negative", row.rate),
                    )));
                }
                let fields = mapping
                    .apply(&row.to_local_record())?
                    .project(PUSHED_TAX_FIELDS);
                self.engine
                    .remote
                    .update(EntityKind::TaxRule.remote_resource(), &key.local_id, &fields)
                    .await?;
                Ok(())
            }
            .await;
            match pushed {
                Ok(()) => {
                    out.write_applied();
                }
                Err(e) => {
                    warn!(server = %key.server, tax_id = %key.local_id, error = %e, "tax push failed");
                    out.issue(e.to_issue(&key));
                }
            }
            batch.outcome(key, &out.build());
        }
        let result = batch.build();
        self.engine.shared().history.push(result.clone());
        result
    }

    /// Lists every shipping method across all shipping zones.
    ///
    /// A zone whose methods cannot be listed is skipped.
    pub async fn fetch_shipping_methods(&self) -> EngineResult<Vec<ShippingMethod>> {
        let remote = &self.engine.remote;
        let zones = remote.list_all(SHIPPING_ZONES, &ListQuery::new()).await?;
        let mapping = self
            .engine
            .mapper()
            .resolve(EntityKind::ShippingMethod, Direction::RemoteToLocal);

        let mut methods = Vec::new();
        for zone in zones {
            let Some(zone_id) = record_id(&zone) else {
                continue;
            };
            let resource = format!("{SHIPPING_ZONES}/{zone_id}/methods");
            let listed = match remote.list_all(&resource, &ListQuery::new()).await {
                Ok(listed) => listed,
                Err(e) => {
                    warn!(server = %self.engine.server_name(), zone = %zone_id, error = %e, "shipping zone skipped");
                    continue;
                }
            };
            for record in listed {
                match mapping
                    .apply(&record)
                    .and_then(|local| ShippingMethod::from_local_record(&local))
                {
                    Ok(method) => methods.push(method),
                    Err(e) => {
                        debug!(zone = %zone_id, error = %e, "shipping method without id or title skipped");
                    }
                }
            }
        }
        Ok(methods)
    }

    /// Builds the title index from the remote shipping methods.
    pub async fn title_index(&self) -> EngineResult<TitleIndex> {
        Ok(TitleIndex::build(&self.fetch_shipping_methods().await?))
    }

    async fn load_shipping_rules(&self) -> EngineResult<(Vec<ShippingMethodMap>, bool)> {
        let rows = self
            .engine
            .store
            .query(EntityKind::ShippingMethod, &StoreFilter::all())
            .await?;
        if rows.is_empty() {
            return Ok((self.engine.server_config().shipping_rule_map.clone(), false));
        }
        let maps = rows
            .iter()
            .map(|row| ShippingMethodMap::from_local_record(&row.fields))
            .collect::<Result<Vec<_>, CoreError>>()?;
        Ok((maps, true))
    }

    /// Re-derives the method id of every shipping rule row from its title.
    ///
    /// Rows whose title is not offered remotely keep their id.
    pub async fn update_shipping_method_ids(&self) -> EngineResult<SyncResult> {
        if !self.engine.server_config().enable_shipping_methods_sync {
            return Err(SyncError::SyncDisabled {
                server: self.engine.server_name().to_string(),
                feature: "enable_shipping_methods_sync",
            });
        }
        let index = self.title_index().await?;
        let (mut rows, stored) = self.load_shipping_rules().await?;

        let mut out = SyncResultBuilder::new();
        for row in &mut rows {
            let resolution = row.begin_resolution(&index).resolve();
            let key = self.key(EntityKind::ShippingMethod, row.shipping_rule());
            match &resolution {
                TitleResolution::Resolved(id) => {
                    debug!(rule = %key.local_id, method_id = %id, "shipping method id resolved");
                }
                TitleResolution::Unresolved => {
                    warn!(rule = %key.local_id, title = %row.title(), "shipping title not offered remotely");
                    out.issue(
                        SyncIssue::new(
                            IssueClass::LocalValidation,
                            format!("no remote shipping method titled '{}'", row.title()),
                        )
                        .for_entity(key.clone())
                        .on_field(Some("wc_shipping_method_title")),
                    );
                }
                TitleResolution::Unchanged => {}
            }
            if stored && !matches!(resolution, TitleResolution::Resolved(_)) {
                continue;
            }
            self.write_shipping_row(&key, row, &mut out).await;
        }
        Ok(out.build())
    }

    /// Changes a shipping rule's title and re-derives its method id.
    pub async fn set_shipping_title(
        &self,
        shipping_rule: &str,
        title: &str,
    ) -> EngineResult<TitleResolution> {
        let mut row = match self
            .engine
            .store
            .read(EntityKind::ShippingMethod, shipping_rule)
            .await
        {
            Ok(row) => ShippingMethodMap::from_local_record(&row.fields)?,
            Err(StoreError::NotFound { .. }) => ShippingMethodMap::new(shipping_rule, title),
            Err(e) => return Err(e.into()),
        };
        let index = self.title_index().await?;
        let resolution = row.set_title(title, &index);
        self.engine
            .store
            .write(EntityKind::ShippingMethod, shipping_rule, &row.to_local_record())
            .await?;
        Ok(resolution)
    }

    async fn write_shipping_row(
        &self,
        key: &EntityKey,
        row: &ShippingMethodMap,
        out: &mut SyncResultBuilder,
    ) {
        let record: Record = row.to_local_record();
        match self
            .engine
            .store
            .write(EntityKind::ShippingMethod, &key.local_id, &record)
            .await
        {
            Ok(()) => {
                out.write_applied();
            }
            Err(e) => {
                out.issue(SyncError::from(e).to_issue(key));
            }
        }
    }
}

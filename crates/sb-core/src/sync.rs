//! Rule Synchronizer
//!
//! Reconciles the browser's dynamic rules with the persisted settings. Each
//! pass reads fresh settings, removes every installed rule, and installs a
//! newly numbered batch. There is no incremental diffing: a full replace is
//! what keeps ids collision-free after a crashed or interleaved earlier pass.
//!
//! Passes are serialized behind an async mutex. A caller that queued while
//! another pass was running returns that pass's result if the pass started
//! after the caller's request, since it already saw the caller's settings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::engine::RuleEngine;
use crate::error::{BlockerError, Result};
use crate::matcher::{rule_count, rules_for_sites, RuleTemplate};
use crate::store::SettingsStore;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// Rules removed by the uninstall step
    pub removed: usize,
    /// Rules installed by this pass
    pub installed: usize,
}

/// First id for a new batch.
///
/// Starts past both the process-local cursor and every id still installed,
/// so batches never collide with rules left behind by an earlier process.
#[inline]
pub fn batch_start(cursor: u32, highest_installed: Option<u32>) -> u32 {
    let past_installed = highest_installed.map_or(1, |id| id.saturating_add(1));
    cursor.max(past_installed).max(1)
}

/// One past the last id of a batch of `site_count` sites starting at `first_id`.
///
/// Fails when the batch would run past `u32::MAX`.
pub fn batch_end(first_id: u32, site_count: usize) -> Result<u32> {
    u32::try_from(rule_count(site_count))
        .ok()
        .and_then(|count| first_id.checked_add(count))
        .ok_or_else(|| BlockerError::Engine("rule id space exhausted".to_string()))
}

#[derive(Debug, Default)]
struct SyncState {
    /// Highest request ticket covered by a finished pass
    completed: u64,
    /// Result of the most recent pass
    last: Option<Result<ReconcileOutcome>>,
    /// Next id this process will hand out
    next_id: u32,
}

/// Keeps installed rules in step with settings.
pub struct RuleSynchronizer {
    store: SettingsStore,
    engine: Arc<dyn RuleEngine>,
    template: RuleTemplate,
    requested: AtomicU64,
    state: Mutex<SyncState>,
}

impl RuleSynchronizer {
    pub fn new(store: SettingsStore, engine: Arc<dyn RuleEngine>, template: RuleTemplate) -> Self {
        Self {
            store,
            engine,
            template,
            requested: AtomicU64::new(0),
            state: Mutex::new(SyncState { next_id: 1, ..SyncState::default() }),
        }
    }

    pub fn engine(&self) -> &Arc<dyn RuleEngine> {
        &self.engine
    }

    /// Bring installed rules in line with current settings.
    ///
    /// Errors are logged here as well as returned; on failure the engine is
    /// left with no rules installed.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().await;

        if state.completed >= ticket {
            if let Some(last) = &state.last {
                debug!("Reconcile request {} covered by an already finished pass", ticket);
                return last.clone();
            }
        }

        // Every request up to here was made before this pass reads settings
        let covered = self.requested.load(Ordering::SeqCst);
        let result = self.run_pass(&mut state).await;

        match &result {
            Ok(outcome) => info!(
                "Rules reconciled: removed {}, installed {}",
                outcome.removed, outcome.installed
            ),
            Err(e) => error!("Rule reconciliation failed: {}", e),
        }

        state.completed = covered;
        state.last = Some(result.clone());
        result
    }

    async fn run_pass(&self, state: &mut SyncState) -> Result<ReconcileOutcome> {
        let settings = self.store.read().await?;
        let installed = self.engine.dynamic_rules().await?;

        let remove_ids: Vec<u32> = installed.iter().map(|rule| rule.id).collect();
        let highest_installed = remove_ids.iter().copied().max();

        self.engine.update_dynamic_rules(&remove_ids, Vec::new()).await?;
        let removed = remove_ids.len();

        if !settings.wants_rules() {
            debug!(
                "No rules wanted (enabled: {}, sites: {})",
                settings.is_enabled,
                settings.blocked_sites.len()
            );
            return Ok(ReconcileOutcome { removed, installed: 0 });
        }

        let first_id = batch_start(state.next_id, highest_installed);
        let count = rule_count(settings.blocked_sites.len());
        let end = batch_end(first_id, settings.blocked_sites.len())?;

        let batch = rules_for_sites(&settings.blocked_sites, first_id, &self.template);
        state.next_id = end;

        if let Err(e) = self.engine.update_dynamic_rules(&[], batch).await {
            self.clear_after_failure().await;
            return Err(e);
        }

        Ok(ReconcileOutcome { removed, installed: count })
    }

    /// Best-effort cleanup so a failed install never leaves a partial set.
    async fn clear_after_failure(&self) {
        let leftover = match self.engine.dynamic_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("Could not list rules after failed install: {}", e);
                return;
            }
        };
        if leftover.is_empty() {
            return;
        }
        let ids: Vec<u32> = leftover.iter().map(|rule| rule.id).collect();
        if let Err(e) = self.engine.update_dynamic_rules(&ids, Vec::new()).await {
            warn!("Could not clear {} leftover rules: {}", ids.len(), e);
        }
    }
}

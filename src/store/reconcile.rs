//! Startup reconciliation between the stored baseline and the live config

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::events::DuckerEvent;
use crate::gain::GainController;

use super::{BaselineRecord, BaselineStore, StoreError};

/// What startup did with the stored baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Stored record matched the ceiling list and was applied
    Adopted,
    /// Nothing stored yet; baseline derived from hardware and saved
    FirstTimeSetup,
    /// Stored record was for a different ceiling list; re-derived and overwritten
    Reconfigured,
    /// Setup is needed but some ceiling mic has no reported level yet
    AwaitingGains,
}

/// Settle the controller's baseline against the store.
///
/// A matching record is applied without touching live levels. Otherwise the
/// setup alert goes up and the baseline is derived from hardware; if any
/// ceiling mic cannot be read yet, nothing is saved and the alert stays up
/// until `complete_setup` succeeds.
pub async fn reconcile_baseline(
    store: &dyn BaselineStore,
    controller: &mut GainController,
    event_tx: &broadcast::Sender<DuckerEvent>,
) -> Reconciliation {
    let ceiling = controller.bank().ids();

    let outcome = match store.load().await {
        Ok(record) if record.matches(&ceiling) => {
            info!("stored baseline matches ceiling mics, applying it");
            controller.adopt_baseline(&record.gain_values);
            controller.restore_all().await;
            return Reconciliation::Adopted;
        }
        Ok(record) => {
            warn!(
                stored = ?record.mic_ids,
                configured = ?ceiling,
                "stored baseline is for a different ceiling mic list, re-deriving"
            );
            Reconciliation::Reconfigured
        }
        Err(StoreError::NotFound(_)) => {
            info!("no stored baseline, running first time setup");
            Reconciliation::FirstTimeSetup
        }
        Err(e) => {
            warn!(?e, "stored baseline unreadable, running first time setup");
            Reconciliation::FirstTimeSetup
        }
    };

    let _ = event_tx.send(DuckerEvent::alert(
        "Setting up Ducker mode",
        "Set-up detected, running initial check. Please wait until this prompt clears.",
        0,
    ));

    if complete_setup(store, controller, event_tx).await {
        outcome
    } else {
        Reconciliation::AwaitingGains
    }
}

/// Derive the baseline from hardware and persist it.
///
/// Returns false, saving nothing, while any ceiling mic is still unread.
/// On success the setup alert is cleared.
pub async fn complete_setup(
    store: &dyn BaselineStore,
    controller: &mut GainController,
    event_tx: &broadcast::Sender<DuckerEvent>,
) -> bool {
    controller.refresh_baseline().await;
    let Some(gains) = controller.bank().baselines() else {
        warn!(missing = ?controller.bank().missing(), "waiting for ceiling mic levels before setup");
        return false;
    };

    let record = BaselineRecord::new(controller.bank().ids(), gains);
    match store.save(&record).await {
        Ok(()) => info!(gains = ?record.gain_values, "first time setup complete"),
        Err(e) => error!(?e, "failed to persist baseline, continuing with live levels"),
    }

    let _ = event_tx.send(DuckerEvent::AlertCleared);
    true
}

use super::authority::{AuthoritySettings, TableAuthority};
use super::replication::BroadcastReplication;
use super::types::{TableEvent, TableSnapshot};
use crate::domain::{CollisionQuery, NetworkClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tracing::info;

/// Channels and collaborators for one table loop.
pub struct TableTaskContext<Q: ?Sized> {
    pub input_rx: mpsc::Receiver<TableEvent>,
    pub replication: BroadcastReplication,
    pub table_state_tx: watch::Sender<TableSnapshot>,
    pub collision: Arc<Q>,
    pub clock: Arc<dyn NetworkClock>,
    pub settings: AuthoritySettings,
    pub tick_interval: Duration,
    pub shutdown: Arc<Notify>,
}

/// Authoritative loop for one table: drain events, tick, publish state.
pub async fn table_task<Q>(ctx: TableTaskContext<Q>)
where
    Q: CollisionQuery + Send + Sync + ?Sized + 'static,
{
    let TableTaskContext {
        mut input_rx,
        mut replication,
        table_state_tx,
        collision,
        clock,
        settings,
        tick_interval,
        shutdown,
    } = ctx;

    let mut authority = TableAuthority::new(settings);
    let dt = tick_interval.as_secs_f32();

    // Drive the fixed-step loop at the configured tick rate.
    let mut interval = tokio::time::interval(tick_interval);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                // Exit cleanly when the table is removed.
                break;
            }
            _ = interval.tick() => {}
        }

        let now = clock.now();
        while let Ok(ev) = input_rx.try_recv() {
            authority.handle_event(ev, now, &mut replication);
        }

        authority.tick(now, dt, collision.as_ref(), &mut replication);

        // Latest full state for joins and lag recovery.
        table_state_tx.send_replace(authority.snapshot(now));
    }

    info!(ticks = authority.tick_count(), "table loop stopped");
}

use crate::aggregator::Aggregator;
use crate::collectors::TelemetrySource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub async fn run<S>(
    aggregator: Aggregator<S>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: TelemetrySource + 'static,
{
    let metrics = aggregator.metrics();
    let aggregator = Arc::new(Mutex::new(aggregator));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_secs = period.as_secs_f64(), "цикл сбора запущен");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("получен сигнал остановки цикла сбора");
                break;
            }
            _ = ticker.tick() => {
                let aggregator = Arc::clone(&aggregator);
                // A panic in a collector ends only this task.
                let cycle = tokio::spawn(async move {
                    let mut guard = aggregator.lock().await;
                    guard.collect().await
                });
                match cycle.await {
                    Ok(snapshot) => {
                        debug!(collected_at = %snapshot.collected_at, "снимок сохранён");
                    }
                    Err(err) => {
                        metrics.inc_collect_error("cycle");
                        error!(error = %err, "цикл сбора завершился аварийно, пропуск");
                    }
                }
            }
        }
    }
}

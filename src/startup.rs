use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::msg::{ActivationBatch, Msg};
use crate::plugin::registry::ActivationOutcome;
use crate::plugin::{PluginContext, PluginId, PluginRegistry};
use crate::signal::Signal;

/// Orchestrates plugin activation after the shell finishes restoring.
///
/// On the first restore event, two batches start concurrently: all
/// plugins flagged deferred, and the explicitly configured id list (if
/// non-empty). Each batch settles regardless of individual failures;
/// once every expected batch has settled, the `all_activated` signal
/// resolves, exactly once.
pub struct StartupSequencer {
    registry: Arc<Mutex<PluginRegistry>>,
    ctx: PluginContext,
    customized: Vec<PluginId>,
    all_activated: Signal,
    restore_seen: bool,
    pending_batches: usize,
    batch_errors: HashMap<ActivationBatch, usize>,
}

impl StartupSequencer {
    pub fn new(
        registry: Arc<Mutex<PluginRegistry>>,
        ctx: PluginContext,
        customized: Vec<PluginId>,
    ) -> Self {
        Self {
            registry,
            ctx,
            customized,
            all_activated: Signal::new(),
            restore_seen: false,
            pending_batches: 0,
            batch_errors: HashMap::new(),
        }
    }

    /// The completion signal: resolves once both activation batches have
    /// settled. Multicast; hand clones to anyone who asks.
    pub fn all_activated(&self) -> Signal {
        self.all_activated.clone()
    }

    pub fn batch_error_count(&self, batch: ActivationBatch) -> usize {
        self.batch_errors.get(&batch).copied().unwrap_or(0)
    }

    /// Handle the shell's restore-complete event. Only the first call
    /// starts activation; repeats are ignored.
    pub fn on_restored(&mut self) {
        if self.restore_seen {
            return;
        }
        self.restore_seen = true;

        let skip_customized = self.customized.is_empty();
        self.pending_batches = if skip_customized { 1 } else { 2 };

        self.spawn_deferred_batch();
        if !skip_customized {
            self.spawn_customized_batch();
        }
    }

    /// Record a settled batch; resolves the completion signal once all
    /// expected batches are in.
    pub fn on_batch_settled(&mut self, batch: ActivationBatch, errors: usize) {
        if self.pending_batches == 0 {
            return;
        }
        self.batch_errors.insert(batch, errors);
        self.pending_batches -= 1;
        tracing::debug!(
            "{} activation batch settled with {errors} errors",
            batch.label()
        );
        if self.pending_batches == 0 && self.all_activated.resolve() {
            tracing::info!("all plugins activated");
        }
    }

    fn spawn_deferred_batch(&self) {
        let registry = Arc::clone(&self.registry);
        let ctx = self.ctx.clone();
        thread::spawn(move || {
            let outcomes = registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .activate_deferred(&ctx);
            let errors = settle_batch(ActivationBatch::Deferred, &outcomes);
            let _ = ctx
                .event_tx
                .send(Msg::ActivationBatchSettled(ActivationBatch::Deferred, errors));
        });
    }

    fn spawn_customized_batch(&self) {
        let registry = Arc::clone(&self.registry);
        let ctx = self.ctx.clone();
        let ids = self.customized.clone();
        thread::spawn(move || {
            // Lock per id so this batch interleaves with the deferred one.
            let outcomes: Vec<ActivationOutcome> = ids
                .into_iter()
                .map(|id| {
                    let result = registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .activate(&id, &ctx);
                    (id, result)
                })
                .collect();
            let errors = settle_batch(ActivationBatch::Customized, &outcomes);
            let _ = ctx.event_tx.send(Msg::ActivationBatchSettled(
                ActivationBatch::Customized,
                errors,
            ));
        });
    }
}

/// Log a batch's outcomes and return its error count. Individual
/// failures log per plugin; the aggregate logs once for the batch.
fn settle_batch(batch: ActivationBatch, outcomes: &[ActivationOutcome]) -> usize {
    let mut errors = 0;
    for (id, result) in outcomes {
        if let Err(err) = result {
            errors += 1;
            tracing::warn!("activating {} plugin {id}: {err}", batch.label());
        }
    }
    if errors > 0 {
        tracing::error!(
            "{} of {} {} plugin activations failed",
            errors,
            outcomes.len(),
            batch.label()
        );
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::plugin::Plugin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fixture {
        sequencer: StartupSequencer,
        rx: mpsc::Receiver<Msg>,
    }

    fn fixture(plugins: Vec<Plugin>, customized: Vec<&str>) -> Fixture {
        let (tx, rx) = mpsc::channel();
        let mut registry = PluginRegistry::new();
        registry.register_module(plugins);
        let ctx = PluginContext {
            commands: Arc::new(Mutex::new(CommandRegistry::new())),
            event_tx: tx,
        };
        let sequencer = StartupSequencer::new(
            Arc::new(Mutex::new(registry)),
            ctx,
            customized.into_iter().map(PluginId::new).collect(),
        );
        Fixture { sequencer, rx }
    }

    /// Drive the event loop by hand until the expected number of batches
    /// settle.
    fn pump_settles(fixture: &mut Fixture, expected: usize) {
        for _ in 0..expected {
            match fixture.rx.recv_timeout(Duration::from_secs(2)) {
                Ok(Msg::ActivationBatchSettled(batch, errors)) => {
                    fixture.sequencer.on_batch_settled(batch, errors);
                }
                other => panic!("expected a batch settle, got {other:?}"),
            }
        }
    }

    fn counting_plugin(id: &str, count: &Arc<AtomicUsize>) -> Plugin {
        let hits = Arc::clone(count);
        Plugin::new(id, "test plugin")
            .deferred()
            .on_activate(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
    }

    #[test]
    fn signal_stays_pending_until_restore() {
        let count = Arc::new(AtomicUsize::new(0));
        let fixture = fixture(vec![counting_plugin("a", &count)], vec![]);
        assert!(!fixture.sequencer.all_activated().is_resolved());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_customized_list_skips_that_batch_entirely() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut fixture = fixture(vec![counting_plugin("a", &count)], vec![]);
        let signal = fixture.sequencer.all_activated();

        fixture.sequencer.on_restored();
        pump_settles(&mut fixture, 1);

        assert!(signal.is_resolved());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            fixture
                .sequencer
                .batch_error_count(ActivationBatch::Customized),
            0
        );
        // Only the deferred batch ever reported.
        assert!(fixture.rx.try_recv().is_err());
    }

    #[test]
    fn both_batches_must_settle_before_resolution() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut fixture = fixture(
            vec![
                counting_plugin("deferred-one", &count),
                counting_plugin("extra", &count),
            ],
            vec!["extra"],
        );
        let signal = fixture.sequencer.all_activated();

        fixture.sequencer.on_restored();
        pump_settles(&mut fixture, 1);
        // One of the two batches is still outstanding.
        let resolved_after_one = signal.is_resolved();
        pump_settles(&mut fixture, 1);

        assert!(!resolved_after_one);
        assert!(signal.is_resolved());
        // "extra" sits in both batches; activation idempotence means it
        // still ran exactly once.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_plugin_settles_the_batch_with_an_error_count() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut fixture = fixture(
            vec![
                counting_plugin("good", &count),
                Plugin::new("bad", "fails")
                    .deferred()
                    .on_activate(|_| Err(anyhow::anyhow!("boom"))),
            ],
            vec![],
        );
        let signal = fixture.sequencer.all_activated();

        fixture.sequencer.on_restored();
        pump_settles(&mut fixture, 1);

        assert!(signal.is_resolved());
        assert_eq!(
            fixture
                .sequencer
                .batch_error_count(ActivationBatch::Deferred),
            1
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeated_restore_events_are_ignored() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut fixture = fixture(vec![counting_plugin("a", &count)], vec![]);

        fixture.sequencer.on_restored();
        fixture.sequencer.on_restored();
        pump_settles(&mut fixture, 1);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        // No second deferred batch was spawned.
        assert!(
            fixture
                .rx
                .recv_timeout(Duration::from_millis(100))
                .is_err()
        );
    }
}

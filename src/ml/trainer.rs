// ============================================================
// Layer 5 - Training Loop
// ============================================================
// The orchestrator. It is a small state machine:
//
//   RUNNING ──(every eval_interval steps)──► EVALUATING ──► RUNNING
//      │                                         │
//      └──(training feed ran dry)──► STOPPED ◄───┘ (policy says stop)
//
// Epoch boundaries are not observed in the data. They are
// estimated: steps_per_epoch = floor(num_train / batch_size),
// and the loop rolls the epoch counter over when the step
// counter reaches that number. With an unbounded, shuffled
// training feed this is the only notion of "epoch" there is.
//
// Order of work inside one step, which matters for the logs
// and for which checkpoint id gets recorded:
//
//   1. pull one batch, train on it
//   2. log the loss when step_in_epoch % log_every == 0
//   3. step_in_epoch += 1
//   4. evaluate when step_in_epoch % eval_interval == 0
//      (a STOP here ends the run before any rollover)
//   5. roll the epoch over when step_in_epoch == steps_per_epoch
//
// Everything is sequential: no evaluation overlaps training and
// no two checkpoint writes overlap.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::data::feed::full_batches;
use crate::domain::traits::{BatchSource, Pull, TrainableModel};
use crate::infra::{
    checkpoint::CheckpointStore,
    metrics::{EvaluationRecord, MetricsLogger},
};
use crate::ml::evaluator::{reduce_to_recall, run_pass, RecallReport};
use crate::ml::policy::{CheckpointId, CheckpointPolicy, RunDecision, SaveDecision};

// ─── Schedule ─────────────────────────────────────────────────────────────────
/// Step counts derived once from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub steps_per_epoch: usize,
    pub eval_interval:   usize,
    pub valid_batches:   usize,
    pub log_every:       usize,
    /// Passes the training feed was opened for; `None` = repeats forever
    pub epoch_limit:     Option<usize>,
}

impl Schedule {
    pub fn new(
        num_train:        usize,
        train_batch_size: usize,
        num_valid:        usize,
        valid_batch_size: usize,
        eval_fraction:    f64,
        log_every:        usize,
        epoch_limit:      Option<usize>,
    ) -> Result<Self> {
        if !(eval_fraction > 0.0 && eval_fraction <= 1.0) {
            bail!("eval_fraction must be in (0, 1], got {}", eval_fraction);
        }

        let steps_per_epoch = full_batches(num_train, train_batch_size);
        if steps_per_epoch == 0 {
            bail!(
                "{} training examples do not fill a single batch of {}",
                num_train,
                train_batch_size
            );
        }

        let valid_batches = full_batches(num_valid, valid_batch_size);
        if valid_batches == 0 {
            bail!(
                "{} validation examples do not fill a single batch of {}",
                num_valid,
                valid_batch_size
            );
        }

        Ok(Self {
            steps_per_epoch,
            eval_interval: eval_interval(steps_per_epoch, eval_fraction),
            valid_batches,
            log_every: log_every.max(1),
            epoch_limit,
        })
    }
}

/// floor(eval_fraction × steps_per_epoch), but never less than one step.
pub fn eval_interval(steps_per_epoch: usize, eval_fraction: f64) -> usize {
    ((eval_fraction * steps_per_epoch as f64).floor() as usize).max(1)
}

// ─── State and outcome ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingState {
    pub epoch:         usize,
    pub step_in_epoch: usize,
    /// Optimizer updates over the whole run
    pub total_steps:   usize,
    pub evaluations:   usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The checkpoint policy ran out of patience
    EarlyStopped,
    /// A training feed opened for a fixed number of passes ran dry
    OutOfData,
    /// A training feed that should repeat forever ran dry
    FeedEnded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub reason:      StopReason,
    pub state:       TrainingState,
    pub best:        Option<CheckpointId>,
    pub best_metric: f64,
    pub last_report: Option<RecallReport>,
}

impl TrainingOutcome {
    /// Checkpoint written by this run, if any evaluation improved.
    ///
    /// Not `store.latest()`: that may point at an earlier run's save.
    pub fn best_checkpoint(&self, store: &CheckpointStore) -> Option<PathBuf> {
        self.best.map(|id| store.path_for(id))
    }
}

// ─── TrainingLoop ─────────────────────────────────────────────────────────────
pub struct TrainingLoop<'a> {
    schedule:   Schedule,
    policy:     CheckpointPolicy,
    group_size: usize,
    store:      &'a CheckpointStore,
    history:    Option<&'a MetricsLogger>,
    state:      TrainingState,
}

impl<'a> TrainingLoop<'a> {
    pub fn new(
        schedule:   Schedule,
        policy:     CheckpointPolicy,
        group_size: usize,
        store:      &'a CheckpointStore,
    ) -> Self {
        Self {
            schedule,
            policy,
            group_size,
            store,
            history: None,
            state: TrainingState::default(),
        }
    }

    /// Append every evaluation to `history`.
    pub fn with_history(mut self, history: &'a MetricsLogger) -> Self {
        self.history = Some(history);
        self
    }

    pub fn run<M, T, V>(
        &mut self,
        model: &mut M,
        train: &mut T,
        valid: &mut V,
    ) -> Result<TrainingOutcome>
    where
        M: TrainableModel + ?Sized,
        T: BatchSource + ?Sized,
        V: BatchSource + ?Sized,
    {
        tracing::info!(
            "Training starts: {} steps per epoch, evaluating every {} steps on {} batches",
            self.schedule.steps_per_epoch,
            self.schedule.eval_interval,
            self.schedule.valid_batches,
        );
        let mut last_report = None;

        loop {
            let batch = match train.next_batch()? {
                Pull::Batch(batch) => batch,
                Pull::Exhausted => {
                    let reason = self.on_training_feed_end();
                    return Ok(self.outcome(reason, last_report));
                }
            };

            let loss = model.train_step(&batch)?;
            if self.state.step_in_epoch % self.schedule.log_every == 0 {
                tracing::info!(
                    "Epoch step: {} Train step: {} loss = {:.6}",
                    self.state.epoch,
                    self.state.step_in_epoch,
                    loss
                );
            }

            self.state.step_in_epoch += 1;
            self.state.total_steps   += 1;

            if self.state.step_in_epoch % self.schedule.eval_interval == 0 {
                let (report, run) = self.evaluate(&*model, valid)?;
                last_report = Some(report);

                if run == RunDecision::Stop {
                    match self.policy.best() {
                        Some(best) => tracing::info!(
                            "Best model at Epoch step: {} Train step: {}",
                            best.epoch,
                            best.step
                        ),
                        None => tracing::info!("No evaluation improved on the initial score"),
                    }
                    tracing::info!("Training completed.");
                    return Ok(self.outcome(StopReason::EarlyStopped, last_report));
                }
            }

            if self.state.step_in_epoch == self.schedule.steps_per_epoch {
                tracing::info!("Completed epoch {}", self.state.epoch);
                self.state.step_in_epoch = 0;
                self.state.epoch        += 1;
            }
        }
    }

    /// One EVALUATING phase: validation pass, recall, policy, maybe a save.
    fn evaluate<M, V>(&mut self, model: &M, valid: &mut V) -> Result<(RecallReport, RunDecision)>
    where
        M: TrainableModel + ?Sized,
        V: BatchSource + ?Sized,
    {
        let epoch = self.state.epoch;
        let step  = self.state.step_in_epoch;
        let _span = tracing::info_span!("evaluation", epoch, step).entered();

        tracing::info!("Evaluating on the validation dataset...");
        valid.reset()?;
        let pass = run_pass(valid, model, self.schedule.valid_batches, self.schedule.log_every)?;
        let report = reduce_to_recall(&pass.scores, &pass.labels, self.group_size);
        self.state.evaluations += 1;

        tracing::info!(
            "Epoch step: {} Train step: {} Evaluation_Metric = {}",
            epoch,
            step,
            report
        );

        let metric   = report.selection_metric();
        let decision = self.policy.on_evaluation(metric, epoch, step);

        let saved = decision.save == SaveDecision::Save;
        if saved {
            tracing::info!("Epoch step: {} Train step: {} Saving checkpoint", epoch, step);
            self.store.save(model, CheckpointId { epoch, step }, metric)?;
        } else {
            tracing::debug!(
                "No improvement over {:.4} ({} in a row)",
                self.policy.best_metric(),
                self.policy.patience_counter()
            );
        }

        if let Some(history) = self.history {
            history.log(&EvaluationRecord::new(epoch, step, &report, saved))?;
        }

        Ok((report, decision.run))
    }

    fn on_training_feed_end(&self) -> StopReason {
        if self.schedule.epoch_limit.is_some() {
            tracing::info!(
                "Done training for {} epochs, {} steps.",
                self.state.epoch,
                self.state.step_in_epoch
            );
            StopReason::OutOfData
        } else {
            tracing::error!(
                "Training feed ran dry although it was opened to repeat forever \
                 (epoch {}, step {}); stopping",
                self.state.epoch,
                self.state.step_in_epoch
            );
            StopReason::FeedEnded
        }
    }

    fn outcome(&self, reason: StopReason, last_report: Option<RecallReport>) -> TrainingOutcome {
        TrainingOutcome {
            reason,
            state:       self.state,
            best:        self.policy.best(),
            best_metric: self.policy.best_metric(),
            last_report,
        }
    }
}

//! Sequential composition of stages over the trampoline.

use super::{DoneCallback, Stage};
use crate::exchange::UnitOfWork;
use crate::scheduler::{Continuation, TrampolineScheduler};
use std::sync::Arc;
use tracing::{debug, trace};

/// Runs stages one after another, stopping at the first failure.
///
/// The first stage runs in a new scheduler frame (or immediately, for
/// transacted units of work). Every following stage is handed to the
/// scheduler as a continuation, so long pipelines never nest native calls.
/// A pipeline always reports asynchronous completion.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Arc<Vec<Arc<dyn Stage>>>,
    scheduler: Arc<TrampolineScheduler>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>, scheduler: Arc<TrampolineScheduler>) -> Self {
        Self {
            name: name.into(),
            stages: Arc::new(Vec::new()),
            scheduler,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        Arc::make_mut(&mut self.stages).push(stage);
        self
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage names in order.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Stage for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, uow: &Arc<UnitOfWork>, on_done: DoneCallback) -> bool {
        if self.stages.is_empty() {
            on_done(true);
            return true;
        }

        let run = PipelineRun {
            name: self.name.clone(),
            stages: self.stages.clone(),
            scheduler: self.scheduler.clone(),
            uow: uow.clone(),
        };
        let task = Continuation::new(move || run.step(0, on_done)).named(format!("{}:start", self.name));

        if uow.is_transacted() {
            self.scheduler.schedule_immediate(task);
        } else {
            self.scheduler.schedule_start(task);
        }
        false
    }
}

struct PipelineRun {
    name: String,
    stages: Arc<Vec<Arc<dyn Stage>>>,
    scheduler: Arc<TrampolineScheduler>,
    uow: Arc<UnitOfWork>,
}

impl PipelineRun {
    fn step(self, index: usize, on_done: DoneCallback) {
        let Some(stage) = self.stages.get(index).cloned() else {
            on_done(false);
            return;
        };
        trace!(pipeline = %self.name, stage = stage.name(), uow_id = %self.uow.id(), "Processing stage");

        let uow = self.uow.clone();
        stage.process(
            &uow,
            Box::new(move |_sync| {
                let next = index + 1;
                if self.uow.is_failed() {
                    debug!(
                        pipeline = %self.name,
                        uow_id = %self.uow.id(),
                        stage = index,
                        "Stopping pipeline after failure"
                    );
                    on_done(false);
                } else if next >= self.stages.len() {
                    on_done(false);
                } else {
                    let scheduler = self.scheduler.clone();
                    let label = format!("{}:{next}", self.name);
                    scheduler.schedule_continue(
                        Continuation::new(move || self.step(next, on_done)).named(label),
                    );
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RouteflowError;
    use crate::exchange::Message;
    use crate::stages::FnStage;
    use crate::testing::RecordingStage;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn done_counter() -> (Arc<AtomicUsize>, DoneCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_runs_stages_in_order() {
        let scheduler = Arc::new(TrampolineScheduler::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new("p", scheduler);
        for label in ["a", "b", "c"] {
            let order = order.clone();
            pipeline = pipeline.stage(Arc::new(FnStage::new(label, move |_: &UnitOfWork| {
                order.lock().push(label);
                Ok(())
            })));
        }
        let uow = Arc::new(UnitOfWork::new(Message::new()));
        let (done, on_done) = done_counter();

        assert!(!pipeline.process(&uow, on_done));
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.stage_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stops_at_first_failure() {
        let scheduler = Arc::new(TrampolineScheduler::new());
        let after = Arc::new(RecordingStage::new("after"));
        let pipeline = Pipeline::new("p", scheduler)
            .stage(Arc::new(FnStage::new("fail", |_: &UnitOfWork| {
                Err(RouteflowError::downstream("bad input"))
            })))
            .stage(after.clone());
        let uow = Arc::new(UnitOfWork::new(Message::new()));
        let (done, on_done) = done_counter();

        pipeline.process(&uow, on_done);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(after.call_count(), 0);
        assert!(uow.is_failed());
    }

    #[test]
    fn test_empty_pipeline_completes_synchronously() {
        let pipeline = Pipeline::new("empty", Arc::new(TrampolineScheduler::new()));
        let uow = Arc::new(UnitOfWork::new(Message::new()));
        let (done, on_done) = done_counter();

        assert!(pipeline.is_empty());
        assert!(pipeline.process(&uow, on_done));
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_long_pipeline_does_not_recurse() {
        let scheduler = Arc::new(TrampolineScheduler::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let mut pipeline = Pipeline::new("long", scheduler);
        for _ in 0..10_000 {
            let hits = hits.clone();
            pipeline = pipeline.stage(Arc::new(FnStage::new("inc", move |_: &UnitOfWork| {
                hits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })));
        }
        let uow = Arc::new(UnitOfWork::new(Message::new()));
        let (done, on_done) = done_counter();

        pipeline.process(&uow, on_done);
        assert_eq!(hits.load(Ordering::Relaxed), 10_000);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transacted_runs_inside_current_loop() {
        let scheduler = Arc::new(TrampolineScheduler::new());
        let pipeline = Arc::new(
            Pipeline::new("tx", scheduler.clone()).stage(Arc::new(crate::stages::NoOpStage::new("n"))),
        );
        let uow = Arc::new(UnitOfWork::new(Message::new()).transacted());
        let finished = Arc::new(AtomicUsize::new(0));

        let p = pipeline.clone();
        let u = uow.clone();
        let f = finished.clone();
        scheduler.schedule_continue(Continuation::new(move || {
            let f2 = f.clone();
            p.process(
                &u,
                Box::new(move |_| {
                    f2.fetch_add(1, Ordering::SeqCst);
                }),
            );
            // schedule_immediate drained the pipeline before returning.
            assert_eq!(f.load(Ordering::SeqCst), 1);
        }));

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}

use std::{
    any::Any,
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{Instant, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::ExecutorConfig,
    error::{BoxError, ExecutorError, TaskFailure},
    executor::{
        event::{EventSink, ExecutorEvent},
        recorder::{RecordOutcome, ResultRecorder},
        summary::{RunOutcome, Summary},
    },
    task::{ContextFnRunner, FnRunner, Task, TaskBuilder, TaskContext, TaskId, TaskResult, TaskRunner},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Empty,
    Accepting,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Registered, or waiting for a concurrency slot.
    Queued,
    Running,
    Succeeded,
    Failed,
    /// Finished after the run stopped waiting; its result was dropped.
    Discarded,
    /// Still queued when the run stopped waiting, so its work never ran.
    Skipped,
}

struct Registry<T> {
    state: ExecutorState,
    tasks: Vec<Task<T>>,
    next_id: TaskId,
    last_run: Option<RunOutcome>,
}

/// Runs a batch of registered tasks concurrently, one result per task.
///
/// An executor runs once: register tasks, call [`Executor::run_all`] (or
/// [`Executor::run_all_with_deadline`]), then read [`Executor::all_results`]
/// and [`Executor::summary`].
pub struct Executor<T> {
    config: ExecutorConfig,
    registry: Mutex<Registry<T>>,
    statuses: Arc<DashMap<TaskId, TaskStatus>>,
    recorder: Arc<ResultRecorder<T>>,
    cancel: CancellationToken,
    events: EventSink,
}

/// What each spawned task needs from its executor.
struct TaskEnv<T> {
    recorder: Arc<ResultRecorder<T>>,
    statuses: Arc<DashMap<TaskId, TaskStatus>>,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
    events: EventSink,
}

/// Owns the task drivers of one run. If the run future is dropped before the
/// run finishes, the drivers are detached rather than aborted and the executor
/// still ends up `Completed`.
struct RunGuard<'a, T: Send + Sync + 'static> {
    executor: &'a Executor<T>,
    set: JoinSet<()>,
    task_ids: Vec<TaskId>,
    started: Instant,
    deadline: Option<Duration>,
    finished: bool,
}

impl<T: Send + Sync + 'static> RunGuard<'_, T> {
    fn stop_waiting(&mut self) {
        self.executor.stop_waiting();
        // Dropping the set would abort the tasks.
        self.set.detach_all();
    }

    fn finish(&mut self, timed_out: bool) -> RunOutcome {
        self.finished = true;
        self.executor
            .complete(&self.task_ids, self.started.elapsed(), self.deadline, timed_out)
    }
}

impl<T: Send + Sync + 'static> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("run dropped before it finished, detaching tasks");
        self.stop_waiting();
        self.finish(true);
    }
}

impl<T: Send + Sync + 'static> Default for Executor<T> {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl<T: Send + Sync + 'static> Executor<T> {
    pub fn new(config: ExecutorConfig) -> Self {
        let events = EventSink::new(config.events.clone());
        Self {
            config,
            registry: Mutex::new(Registry {
                state: ExecutorState::Empty,
                tasks: Vec::new(),
                next_id: 0,
                last_run: None,
            }),
            statuses: Arc::new(DashMap::new()),
            recorder: Arc::new(ResultRecorder::new()),
            cancel: CancellationToken::new(),
            events,
        }
    }

    /// Registers a zero-argument async closure.
    pub fn register<F, Fut, E>(&self, name: impl Into<String>, work: F) -> Result<TaskId, ExecutorError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.register_runner(name, FnRunner(work))
    }

    /// Registers an async closure that receives its [`TaskContext`].
    pub fn register_with_context<F, Fut, E>(
        &self,
        name: impl Into<String>,
        work: F,
    ) -> Result<TaskId, ExecutorError>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.register_runner(name, ContextFnRunner(work))
    }

    /// Registers synchronous work that runs on the blocking pool.
    pub fn register_blocking<F, E>(&self, name: impl Into<String>, work: F) -> Result<TaskId, ExecutorError>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.register_with(name, |builder| builder.spawn_blocking(work))
    }

    pub fn register_runner<R>(&self, name: impl Into<String>, runner: R) -> Result<TaskId, ExecutorError>
    where
        R: TaskRunner<Output = T>,
    {
        self.register_with(name, |builder| builder.spawn_async(runner))
    }

    fn register_with(
        &self,
        name: impl Into<String>,
        build: impl FnOnce(TaskBuilder) -> Task<T>,
    ) -> Result<TaskId, ExecutorError> {
        let name = name.into();
        let mut registry = self.registry.lock();
        match registry.state {
            ExecutorState::Running | ExecutorState::Completed => {
                warn!(task_name = %name, "registration rejected, executor already started");
                return Err(ExecutorError::RegistrationClosed { task_name: name });
            }
            ExecutorState::Empty => registry.state = ExecutorState::Accepting,
            ExecutorState::Accepting => {}
        }

        registry.next_id += 1;
        let task_id = registry.next_id;
        let mut builder = TaskBuilder::new(task_id);
        builder.with_name(name);
        let task = build(builder);

        debug!(task_id, task_name = %task.name, "task registered");
        self.statuses.insert(task_id, TaskStatus::Queued);
        registry.tasks.push(task);
        Ok(task_id)
    }

    pub fn state(&self) -> ExecutorState {
        self.registry.lock().state
    }

    pub fn len(&self) -> usize {
        self.registry.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.registry.lock().tasks.iter().map(|t| t.task_id).collect()
    }

    pub fn task_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.statuses.get(&task_id).map(|s| *s)
    }

    /// Read access to the recorded results.
    ///
    /// Only the executor writes results:
    ///
    /// ```compile_fail
    /// let executor: miniexec::Executor<i32> = miniexec::Executor::default();
    /// executor.recorder().close();
    /// ```
    pub fn recorder(&self) -> &ResultRecorder<T> {
        &self.recorder
    }

    /// Runs every registered task and waits for all of them. Returns the wall
    /// time of the whole run. Task errors end up in the results, not here.
    pub async fn run_all(&self) -> Result<Duration, ExecutorError> {
        let outcome = self.run(None).await?;
        Ok(outcome.wall_time)
    }

    /// Like [`Executor::run_all`], but stops waiting once `deadline` elapses.
    ///
    /// Tasks still in flight keep running; their contexts are cancelled and
    /// whatever they produce afterwards is discarded.
    pub async fn run_all_with_deadline(&self, deadline: Duration) -> Result<RunOutcome, ExecutorError> {
        self.run(Some(deadline)).await
    }

    fn start(&self) -> Result<Vec<Task<T>>, ExecutorError> {
        let mut registry = self.registry.lock();
        match registry.state {
            ExecutorState::Running | ExecutorState::Completed => Err(ExecutorError::AlreadyStarted),
            ExecutorState::Empty | ExecutorState::Accepting => {
                registry.state = ExecutorState::Running;
                Ok(registry.tasks.clone())
            }
        }
    }

    #[instrument(name = "run_all", skip(self))]
    async fn run(&self, deadline: Option<Duration>) -> Result<RunOutcome, ExecutorError> {
        let tasks = self.start()?;
        let limiter = self.config.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        info!(tasks = tasks.len(), max_concurrency = ?self.config.max_concurrency, "run started");
        self.events.emit(ExecutorEvent::RunStarted { tasks: tasks.len() });

        let mut guard = RunGuard {
            executor: self,
            set: JoinSet::new(),
            task_ids: tasks.iter().map(|t| t.task_id).collect(),
            started: Instant::now(),
            deadline,
            finished: false,
        };
        for task in tasks {
            guard.set.spawn(execute_task(
                task,
                TaskEnv {
                    recorder: Arc::clone(&self.recorder),
                    statuses: Arc::clone(&self.statuses),
                    limiter: limiter.clone(),
                    cancel: self.cancel.clone(),
                    events: self.events.clone(),
                },
            ));
        }

        let timed_out = match deadline {
            None => {
                join_all(&mut guard.set).await;
                false
            }
            Some(deadline) => {
                let joined = timeout(deadline, join_all(&mut guard.set)).await;
                if joined.is_ok() {
                    false
                } else {
                    guard.stop_waiting();
                    true
                }
            }
        };
        Ok(guard.finish(timed_out))
    }

    /// Closes the recorder and cancels every task context. Tasks that have
    /// not started yet will not start.
    fn stop_waiting(&self) {
        self.recorder.close();
        self.cancel.cancel();
    }

    fn complete(
        &self,
        task_ids: &[TaskId],
        wall_time: Duration,
        deadline: Option<Duration>,
        timed_out: bool,
    ) -> RunOutcome {
        self.recorder.close();

        let unfinished: Vec<TaskId> = task_ids
            .iter()
            .copied()
            .filter(|id| !self.recorder.contains(*id))
            .collect();
        if timed_out {
            warn!(?wall_time, unfinished = ?unfinished, "stopped waiting before all tasks finished");
        }
        info!(?wall_time, recorded = self.recorder.len(), timed_out, "run finished");

        let outcome = RunOutcome {
            wall_time,
            deadline,
            timed_out,
            unfinished,
        };
        {
            let mut registry = self.registry.lock();
            registry.state = ExecutorState::Completed;
            registry.last_run = Some(outcome.clone());
        }
        self.events.emit(ExecutorEvent::RunFinished { wall_time, timed_out });
        outcome
    }

    pub fn summary(&self) -> Result<Summary, ExecutorError> {
        let outcome = self
            .registry
            .lock()
            .last_run
            .clone()
            .ok_or(ExecutorError::NotCompleted)?;
        Ok(Summary::new(self.recorder.timings(), &outcome))
    }
}

impl<T: Clone + Send + Sync + 'static> Executor<T> {
    pub fn all_results(&self) -> Vec<TaskResult<T>> {
        self.recorder.all_results()
    }
}

async fn join_all(set: &mut JoinSet<()>) {
    while let Some(joined) = set.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "task driver stopped unexpectedly");
        }
    }
}

async fn execute_task<T: Send + Sync + 'static>(task: Task<T>, env: TaskEnv<T>) {
    let permit = match &env.limiter {
        Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
        None => None,
    };

    let task_id = task.task_id;
    if !env.recorder.is_accepting() {
        debug!(task_id, task_name = %task.name, "run stopped waiting before task started, skipped");
        env.statuses.insert(task_id, TaskStatus::Skipped);
        return;
    }
    env.statuses.insert(task_id, TaskStatus::Running);
    env.events.emit(ExecutorEvent::TaskStarted {
        task_id,
        name: task.name.clone(),
    });
    debug!(task_id, task_name = %task.name, "task started");

    let started_at = SystemTime::now();
    let clock = Instant::now();
    let ctx = TaskContext::new(task_id, task.name.clone(), env.cancel.clone());
    let runner = Arc::clone(&task.runner);
    // A separate tokio task so a panic in the work comes back as a JoinError.
    let outcome = match tokio::spawn(async move { runner.run(ctx).await }).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskFailure::from(err)),
        Err(err) if err.is_panic() => Err(TaskFailure::Panicked {
            message: panic_message(err.into_panic()),
        }),
        Err(err) => Err(TaskFailure::Error {
            message: err.to_string(),
        }),
    };
    let duration = clock.elapsed();
    drop(permit);

    let success = outcome.is_ok();
    if let Err(failure) = &outcome {
        warn!(task_id, task_name = %task.name, error = %failure, ?duration, "task failed");
    } else {
        debug!(task_id, task_name = %task.name, ?duration, "task completed");
    }

    let result = TaskResult::new(task_id, task.name.clone(), outcome, started_at, duration);
    match env.recorder.record(result) {
        RecordOutcome::Recorded => {
            let status = if success { TaskStatus::Succeeded } else { TaskStatus::Failed };
            env.statuses.insert(task_id, status);
            env.events.emit(ExecutorEvent::TaskFinished {
                task_id,
                name: task.name,
                success,
                duration,
            });
        }
        RecordOutcome::Closed => {
            warn!(task_id, task_name = %task.name, "result arrived after the run stopped waiting, discarded");
            env.statuses.insert(task_id, TaskStatus::Discarded);
            env.events.emit(ExecutorEvent::TaskDiscarded {
                task_id,
                name: task.name,
            });
        }
        RecordOutcome::Duplicate => {
            error!(task_id, task_name = %task.name, "duplicate result for task, dropped");
            env.statuses.insert(task_id, TaskStatus::Discarded);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use tokio::time::sleep;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_every_task_gets_exactly_one_result() {
        let executor = Executor::default();
        let mut registered = HashSet::new();
        for i in 0..20u64 {
            let id = executor
                .register(format!("task-{i}"), move || async move {
                    sleep(Duration::from_millis(i * 7 % 13)).await;
                    Ok::<_, BoxError>(i)
                })
                .unwrap();
            registered.insert(id);
        }
        assert_eq!(executor.task_ids(), (1..=20).collect::<Vec<_>>());

        executor.run_all().await.unwrap();

        let results = executor.all_results();
        assert_eq!(results.len(), 20);
        let ids: HashSet<TaskId> = results.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, registered);
        assert_eq!(executor.state(), ExecutorState::Completed);
        assert!(results.iter().all(|r| executor.task_status(r.task_id) == Some(TaskStatus::Succeeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_and_speedup() {
        let executor = Executor::default();
        let a = executor
            .register("A", || async {
                sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(1)
            })
            .unwrap();
        let b = executor
            .register("B", || async {
                sleep(Duration::from_millis(10)).await;
                Ok::<_, BoxError>(2)
            })
            .unwrap();
        let c = executor
            .register("C", || async { Err::<i32, _>("boom") })
            .unwrap();

        let wall = executor.run_all().await.unwrap();

        let results = executor.all_results();
        let by_id = |id| results.iter().find(|r| r.task_id == id).unwrap();
        assert_eq!(by_id(a).value(), Some(&1));
        assert_eq!(by_id(b).value(), Some(&2));
        assert_eq!(by_id(c).error(), Some(&TaskFailure::Error { message: "boom".into() }));
        assert_eq!(executor.task_status(c), Some(TaskStatus::Failed));

        let summary = executor.summary().unwrap();
        assert_eq!(summary.wall_time, wall);
        assert!(wall >= Duration::from_millis(50));
        assert!(wall < Duration::from_millis(60));
        assert!(summary.serial_time >= Duration::from_millis(60));
        assert!(summary.speedup().unwrap() > 1.0);
        assert_eq!((summary.succeeded, summary.failed), (2, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_lost_results_under_repeated_runs() {
        for _ in 0..1000 {
            let executor = Executor::default();
            for i in 0..100 {
                executor
                    .register(format!("count-{i}"), || async {
                        let mut counter = 0u32;
                        counter += 1;
                        Ok::<_, BoxError>(counter)
                    })
                    .unwrap();
            }
            executor.run_all().await.unwrap();

            let results = executor.all_results();
            assert_eq!(results.len(), 100);
            assert_eq!(results.iter().filter_map(|r| r.value()).sum::<u32>(), 100);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_idempotent_after_completion() {
        let executor = Executor::default();
        for i in 0..5 {
            executor.register(format!("t{i}"), move || async move { Ok::<_, BoxError>(i) }).unwrap();
        }
        executor.run_all().await.unwrap();
        assert_eq!(executor.all_results(), executor.all_results());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_partial_results() {
        let executor = Executor::default();
        let mut stuck = 0;
        for i in 0..5u64 {
            let id = if i == 2 {
                executor
                    .register("stuck", || std::future::pending::<Result<u64, BoxError>>())
                    .unwrap()
            } else {
                executor
                    .register(format!("quick-{i}"), move || async move {
                        sleep(Duration::from_millis(10 * i)).await;
                        Ok::<_, BoxError>(i)
                    })
                    .unwrap()
            };
            if i == 2 {
                stuck = id;
            }
        }

        let outcome = executor
            .run_all_with_deadline(Duration::from_millis(100))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(outcome.wall_time >= Duration::from_millis(100));
        assert!(outcome.wall_time < Duration::from_millis(150));
        assert_eq!(outcome.unfinished, vec![stuck]);
        assert_eq!(executor.all_results().len(), 4);
        assert_eq!(executor.state(), ExecutorState::Completed);
        assert_eq!(executor.task_status(stuck), Some(TaskStatus::Running));

        let summary = executor.summary().unwrap();
        assert!(summary.timed_out);
        assert_eq!(summary.total(), 5);
        assert!(matches!(
            outcome.into_result(),
            Err(ExecutorError::TimedOut { unfinished, .. }) if unfinished == vec![stuck]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_not_reached_is_complete() {
        let executor = Executor::default();
        executor
            .register("fast", || async {
                sleep(Duration::from_millis(5)).await;
                Ok::<_, BoxError>(())
            })
            .unwrap();
        let outcome = executor
            .run_all_with_deadline(Duration::from_millis(100))
            .await
            .unwrap();
        assert!(outcome.is_complete());
        assert!(outcome.unfinished.is_empty());
        let wall = outcome.into_result().unwrap();
        assert!(wall >= Duration::from_millis(5) && wall < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_is_discarded() {
        let (tx, rx) = async_channel::unbounded();
        let executor = Executor::new(ExecutorConfig::new().with_events(tx));
        let slow = executor
            .register("slow", || async {
                sleep(Duration::from_millis(200)).await;
                Ok::<_, BoxError>(7)
            })
            .unwrap();

        let outcome = executor.run_all_with_deadline(Duration::from_millis(50)).await.unwrap();
        assert_eq!(outcome.unfinished, vec![slow]);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(executor.recorder().discarded(), 1);
        assert!(executor.all_results().is_empty());
        assert_eq!(executor.task_status(slow), Some(TaskStatus::Discarded));

        let events: Vec<ExecutorEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.contains(&ExecutorEvent::TaskDiscarded {
            task_id: slow,
            name: "slow".into()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_observes_cancellation_on_deadline() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let executor = Executor::default();
        let flag = Arc::clone(&saw_cancel);
        executor
            .register_with_context("cooperative", move |ctx: TaskContext| {
                let flag = Arc::clone(&flag);
                async move {
                    ctx.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                    Err::<(), _>("stopped")
                }
            })
            .unwrap();

        let outcome = executor.run_all_with_deadline(Duration::from_millis(20)).await.unwrap();
        assert!(outcome.timed_out);

        sleep(Duration::from_millis(1)).await;
        assert!(saw_cancel.load(Ordering::SeqCst));
        assert_eq!(executor.recorder().discarded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_queues_tasks() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = Executor::new(ExecutorConfig::new().with_max_concurrency(2));
        for i in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            executor
                .register(format!("t{i}"), move || {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(())
                    }
                })
                .unwrap();
        }

        let wall = executor.run_all().await.unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert!(wall >= Duration::from_millis(30));
        assert_eq!(executor.all_results().len(), 6);
        // Queue time is not part of a task's own duration.
        assert!(executor.all_results().iter().all(|r| r.duration < Duration::from_millis(15)));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let executor = Executor::default();
        let bad = executor
            .register("bad", || async {
                if true {
                    panic!("kaboom");
                }
                Ok::<i32, BoxError>(0)
            })
            .unwrap();
        let good = executor.register("good", || async { Ok::<_, BoxError>(5) }).unwrap();

        executor.run_all().await.unwrap();

        let results = executor.all_results();
        let bad = results.iter().find(|r| r.task_id == bad).unwrap();
        assert_eq!(bad.error(), Some(&TaskFailure::Panicked { message: "kaboom".into() }));
        let good = results.iter().find(|r| r.task_id == good).unwrap();
        assert_eq!(good.value(), Some(&5));
    }

    #[tokio::test]
    async fn test_blocking_panic_is_isolated() {
        let executor = Executor::default();
        let bad = executor
            .register_blocking("bad", || {
                if true {
                    panic!("blocking kaboom");
                }
                Ok::<i32, BoxError>(0)
            })
            .unwrap();
        let good = executor.register_blocking("good", || Ok::<_, BoxError>(5)).unwrap();

        executor.run_all().await.unwrap();

        let results = executor.all_results();
        assert_eq!(results.len(), 2);
        let bad_result = results.iter().find(|r| r.task_id == bad).unwrap();
        assert_eq!(
            bad_result.error(),
            Some(&TaskFailure::Panicked { message: "blocking kaboom".into() })
        );
        assert_eq!(executor.task_status(bad), Some(TaskStatus::Failed));
        let good_result = results.iter().find(|r| r.task_id == good).unwrap();
        assert_eq!(good_result.value(), Some(&5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_tasks_do_not_start_after_deadline() {
        let started = Arc::new(AtomicUsize::new(0));
        let executor = Executor::new(ExecutorConfig::new().with_max_concurrency(1));
        let mut ids = Vec::new();
        for i in 0..3 {
            let started = Arc::clone(&started);
            let id = executor
                .register(format!("slow-{i}"), move || {
                    let started = Arc::clone(&started);
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(100)).await;
                        Ok::<_, BoxError>(i)
                    }
                })
                .unwrap();
            ids.push(id);
        }

        let outcome = executor.run_all_with_deadline(Duration::from_millis(50)).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.unfinished, ids);
        assert_eq!(started.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(executor.task_status(ids[0]), Some(TaskStatus::Discarded));
        assert_eq!(executor.task_status(ids[1]), Some(TaskStatus::Skipped));
        assert_eq!(executor.task_status(ids[2]), Some(TaskStatus::Skipped));
        assert_eq!(executor.recorder().discarded(), 1);
        assert!(executor.all_results().is_empty());

        // Without a deadline, a limit of 1 runs the tasks one after another.
        let serial = Executor::new(ExecutorConfig::new().with_max_concurrency(1));
        for i in 0..3u64 {
            serial
                .register(format!("step-{i}"), || async {
                    sleep(Duration::from_millis(10)).await;
                    Ok::<_, BoxError>(())
                })
                .unwrap();
        }
        let wall = serial.run_all().await.unwrap();
        let summary = serial.summary().unwrap();
        assert_eq!(summary.succeeded, 3);
        assert!(wall >= summary.serial_time);
        assert!(wall < summary.serial_time + Duration::from_millis(5));
        assert!(summary.speedup().unwrap() <= 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_result_leaves_terminal_status() {
        let executor = Executor::default();
        let id = executor.register("real", || async { Ok::<_, BoxError>(1) }).unwrap();
        executor.recorder.record(TaskResult::new(
            id,
            "stale".into(),
            Ok(999),
            SystemTime::now(),
            Duration::ZERO,
        ));

        executor.run_all().await.unwrap();

        assert_eq!(executor.task_status(id), Some(TaskStatus::Discarded));
        assert_eq!(executor.all_results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_still_completes() {
        let executor = Executor::default();
        let slow = executor
            .register("slow", || async {
                sleep(Duration::from_millis(200)).await;
                Ok::<_, BoxError>(1)
            })
            .unwrap();
        let fast = executor.register("fast", || async { Ok::<_, BoxError>(2) }).unwrap();

        assert!(timeout(Duration::from_millis(50), executor.run_all()).await.is_err());

        assert_eq!(executor.state(), ExecutorState::Completed);
        let summary = executor.summary().unwrap();
        assert!(summary.timed_out);
        assert_eq!(summary.unfinished, vec![slow]);
        assert_eq!(executor.all_results().iter().map(|r| r.task_id).collect::<Vec<_>>(), vec![fast]);
        assert_eq!(executor.run_all().await, Err(ExecutorError::AlreadyStarted));

        // The driver was detached, not aborted, so the late result is accounted for.
        sleep(Duration::from_millis(300)).await;
        assert_eq!(executor.task_status(slow), Some(TaskStatus::Discarded));
        assert_eq!(executor.recorder().discarded(), 1);
    }

    #[tokio::test]
    async fn test_blocking_work_runs_in_parallel() {
        let executor = Executor::default();
        for i in 0..4u64 {
            executor
                .register_blocking(format!("sum-{i}"), move || {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok::<_, BoxError>((0..=i).sum::<u64>())
                })
                .unwrap();
        }

        let wall = executor.run_all().await.unwrap();
        let summary = executor.summary().unwrap();
        assert_eq!(summary.succeeded, 4);
        assert!(wall < summary.serial_time);
        let mut values: Vec<u64> = executor.all_results().iter().filter_map(|r| r.value().copied()).collect();
        values.sort();
        assert_eq!(values, vec![0, 1, 3, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_rejected_while_running() {
        let executor = Arc::new(Executor::default());
        executor
            .register("long", || async {
                sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(0)
            })
            .unwrap();

        let runner = Arc::clone(&executor);
        let handle = tokio::spawn(async move { runner.run_all().await });
        while executor.state() != ExecutorState::Running {
            tokio::task::yield_now().await;
        }

        let err = executor.register("late", || async { Ok::<_, BoxError>(1) }).unwrap_err();
        assert_eq!(err, ExecutorError::RegistrationClosed { task_name: "late".into() });

        handle.await.unwrap().unwrap();
        assert_eq!(executor.len(), 1);
        assert!(executor.register("after", || async { Ok::<_, BoxError>(1) }).is_err());
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let executor: Executor<()> = Executor::default();
        assert_eq!(executor.summary(), Err(ExecutorError::NotCompleted));
        assert_eq!(executor.state(), ExecutorState::Empty);

        executor.run_all().await.unwrap();
        assert_eq!(executor.run_all().await, Err(ExecutorError::AlreadyStarted));
        assert_eq!(
            executor.run_all_with_deadline(Duration::from_secs(1)).await,
            Err(ExecutorError::AlreadyStarted)
        );
        assert_eq!(executor.summary().unwrap().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_the_run() {
        let (tx, rx) = async_channel::unbounded();
        let executor = Executor::new(ExecutorConfig::new().with_events(tx));
        let id = executor.register("only", || async { Ok::<_, BoxError>(1) }).unwrap();
        executor.run_all().await.unwrap();

        let events: Vec<ExecutorEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.first(), Some(&ExecutorEvent::RunStarted { tasks: 1 }));
        assert_eq!(events[1], ExecutorEvent::TaskStarted { task_id: id, name: "only".into() });
        assert!(matches!(
            events[2],
            ExecutorEvent::TaskFinished { task_id, success: true, .. } if task_id == id
        ));
        assert!(matches!(events.last(), Some(ExecutorEvent::RunFinished { timed_out: false, .. })));
    }
}

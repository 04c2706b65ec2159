//! Adaptive frame-budget task scheduler.
//!
//! Tasks register once with a priority class and run each frame in priority
//! order. Critical tasks always run; everything else shares an adaptive
//! time budget derived from an exponential moving average of recent frame
//! times. Tasks that cannot finish inside the remaining budget return
//! `completed: false` and keep their place for the next frame.

use std::time::Instant;
use tracing::warn;

/// Hard priority classes, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Critical,
    High,
    Normal,
    Low,
}

/// What a task reports back from one execution.
#[derive(Debug, Clone, Copy)]
pub struct TaskRun {
    /// False keeps the task's pending work queued for the next frame.
    pub completed: bool,
    /// Self-reported elapsed time; the scheduler also measures externally.
    pub elapsed_ms: f64,
    /// Units of work processed (chunks generated, columns ticked, ...).
    pub work_units: u32,
}

impl TaskRun {
    /// A run that did nothing (empty queue).
    pub const fn idle() -> Self {
        Self {
            completed: true,
            elapsed_ms: 0.0,
            work_units: 0,
        }
    }

    pub const fn units(work_units: u32, completed: bool) -> Self {
        Self {
            completed,
            elapsed_ms: 0.0,
            work_units,
        }
    }
}

/// Per-execution view handed to a task.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    /// Frame delta time, milliseconds.
    pub delta_time_ms: f64,
    /// Budget left for background work this frame, milliseconds. Tasks may
    /// self-limit against this and bail early.
    pub remaining_budget_ms: f64,
}

/// Opt-in per-task counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskMetrics {
    /// EMA of measured execution time, milliseconds.
    pub exec_ema_ms: f64,
    pub executions: u64,
    pub skips: u64,
    pub work_units: u64,
}

/// Rolling frame-time tracker and budget policy.
#[derive(Debug, Clone)]
pub struct FrameBudget {
    avg_frame_ms: f64,
    /// Fraction of the average frame granted to background work.
    pub budget_ratio: f64,
    pub min_budget_ms: f64,
    pub max_budget_ms: f64,
    /// Blend factor for new frame-time measurements.
    pub adaptation_rate: f64,
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self {
            avg_frame_ms: 0.0,
            budget_ratio: 0.25,
            min_budget_ms: 1.0,
            max_budget_ms: 8.0,
            adaptation_rate: 0.1,
        }
    }
}

impl FrameBudget {
    /// Budget with explicit policy values and a fresh frame average.
    pub fn with_policy(
        budget_ratio: f64,
        min_budget_ms: f64,
        max_budget_ms: f64,
        adaptation_rate: f64,
    ) -> Self {
        Self {
            avg_frame_ms: 0.0,
            budget_ratio,
            min_budget_ms,
            max_budget_ms,
            adaptation_rate,
        }
    }

    /// Blend a measured frame time into the rolling average.
    pub fn report_frame(&mut self, frame_ms: f64) {
        if self.avg_frame_ms == 0.0 {
            self.avg_frame_ms = frame_ms;
        } else {
            self.avg_frame_ms += (frame_ms - self.avg_frame_ms) * self.adaptation_rate;
        }
    }

    pub fn avg_frame_ms(&self) -> f64 {
        self.avg_frame_ms
    }

    /// Current background budget in milliseconds.
    pub fn budget_ms(&self) -> f64 {
        (self.avg_frame_ms * self.budget_ratio).clamp(self.min_budget_ms, self.max_budget_ms)
    }
}

/// Per-frame time breakdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub critical_ms: f64,
    pub background_ms: f64,
    pub tasks_run: u32,
    pub tasks_skipped: u32,
}

struct TaskEntry<C> {
    id: String,
    priority: TaskPriority,
    run: Box<dyn FnMut(&mut C, &TaskContext) -> TaskRun>,
    metrics: TaskMetrics,
}

/// Task registry and frame driver, generic over the context the tasks
/// operate on.
pub struct Scheduler<C> {
    tasks: Vec<TaskEntry<C>>,
    budget: FrameBudget,
    metrics_enabled: bool,
    last_frame: FrameStats,
}

impl<C> Scheduler<C> {
    pub fn new(budget: FrameBudget) -> Self {
        Self {
            tasks: Vec::new(),
            budget,
            metrics_enabled: false,
            last_frame: FrameStats::default(),
        }
    }

    /// Register a task. Re-registering an id replaces the old task.
    pub fn register_task(
        &mut self,
        id: impl Into<String>,
        priority: TaskPriority,
        run: impl FnMut(&mut C, &TaskContext) -> TaskRun + 'static,
    ) {
        let id = id.into();
        if let Some(existing) = self.tasks.iter_mut().find(|t| t.id == id) {
            warn!(task = %id, "task id registered twice; replacing");
            existing.priority = priority;
            existing.run = Box::new(run);
            existing.metrics = TaskMetrics::default();
            return;
        }
        self.tasks.push(TaskEntry {
            id,
            priority,
            run: Box::new(run),
            metrics: TaskMetrics::default(),
        });
        // Stable sort keeps registration order inside each class.
        self.tasks.sort_by_key(|t| t.priority);
    }

    pub fn enable_metrics(&mut self, enabled: bool) {
        self.metrics_enabled = enabled;
    }

    pub fn metrics(&self, id: &str) -> Option<TaskMetrics> {
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.metrics)
    }

    pub fn budget(&self) -> &FrameBudget {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut FrameBudget {
        &mut self.budget
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    /// Feed the frame-time average.
    pub fn report_frame(&mut self, frame_ms: f64) {
        self.budget.report_frame(frame_ms);
    }

    /// Run one frame's worth of tasks against the context.
    ///
    /// Critical tasks run unconditionally; lower classes run in priority
    /// order and are skipped once the background budget is spent.
    pub fn run_frame(&mut self, ctx: &mut C, delta_time_ms: f64) -> FrameStats {
        let budget_ms = self.budget.budget_ms();
        let mut stats = FrameStats::default();

        for task in &mut self.tasks {
            let critical = task.priority == TaskPriority::Critical;
            let remaining = budget_ms - stats.background_ms;
            if !critical && remaining <= 0.0 {
                stats.tasks_skipped += 1;
                if self.metrics_enabled {
                    task.metrics.skips += 1;
                }
                continue;
            }

            let task_ctx = TaskContext {
                delta_time_ms,
                remaining_budget_ms: if critical { f64::MAX } else { remaining },
            };
            let started = Instant::now();
            let run = (task.run)(ctx, &task_ctx);
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            if critical {
                stats.critical_ms += elapsed_ms;
            } else {
                stats.background_ms += elapsed_ms;
            }
            stats.tasks_run += 1;

            if self.metrics_enabled {
                let metrics = &mut task.metrics;
                metrics.executions += 1;
                metrics.work_units += run.work_units as u64;
                if metrics.exec_ema_ms == 0.0 {
                    metrics.exec_ema_ms = elapsed_ms;
                } else {
                    metrics.exec_ema_ms += (elapsed_ms - metrics.exec_ema_ms) * 0.1;
                }
            }
        }

        self.last_frame = stats;
        stats
    }
}

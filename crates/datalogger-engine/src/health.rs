/// Task liveness tracking, adapted from the same pulse/monitor pattern the
/// host daemon uses to watch its own workers.
///
/// Every long-running task holds a `TaskPulse` and calls `.tick()` once per
/// loop iteration; the watchdog holds the matching `TaskMonitor`s and flags a
/// task as unresponsive once it stops pulsing.
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::watch;

#[derive(Clone)]
pub struct TaskPulse {
    tx: watch::Sender<Instant>,
}

impl TaskPulse {
    pub fn tick(&self) {
        let _ = self.tx.send(Instant::now());
    }
}

pub struct TaskMonitor {
    pub name: String,
    rx: watch::Receiver<Instant>,
}

impl TaskMonitor {
    pub fn elapsed(&self) -> std::time::Duration {
        self.rx.borrow().elapsed()
    }

    pub fn is_alive(&self, timeout: std::time::Duration) -> bool {
        self.elapsed() < timeout
    }
}

pub fn task_pulse(name: impl Into<String>) -> (TaskPulse, TaskMonitor) {
    let (tx, rx) = watch::channel(Instant::now());
    (
        TaskPulse { tx },
        TaskMonitor {
            name: name.into(),
            rx,
        },
    )
}

/// Central health state: task monitors plus the watchdog-owned memory gauge.
pub struct HealthCollector {
    pub start_time: Instant,
    pub monitors: std::sync::Mutex<Vec<TaskMonitor>>,
    pub memory_mb: AtomicU64, // f32 bits
    pub restart_count: AtomicU32,
}

impl HealthCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            monitors: std::sync::Mutex::new(Vec::new()),
            memory_mb: AtomicU64::new(0),
            restart_count: AtomicU32::new(0),
        }
    }

    pub fn register_monitor(&self, monitor: TaskMonitor) {
        self.monitors.lock().unwrap().push(monitor);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn all_tasks_healthy(&self, timeout: std::time::Duration) -> bool {
        self.monitors
            .lock()
            .unwrap()
            .iter()
            .all(|m| m.is_alive(timeout))
    }
}

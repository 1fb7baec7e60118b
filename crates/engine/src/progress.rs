use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Start {
        task: &'static str,
        total: usize,
    },
    Advance {
        task: &'static str,
        completed: usize,
        total: usize,
    },
    Finish {
        task: &'static str,
    },
}

pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Shared completed-work counter for one parallel section. Informational
/// only; correctness never depends on it. The counter is atomic so worker
/// threads can bump it without losing updates.
pub struct Progress {
    task: &'static str,
    total: usize,
    completed: AtomicUsize,
    sink: Option<ProgressSink>,
}

impl Progress {
    pub fn new(task: &'static str, total: usize, sink: Option<ProgressSink>) -> Self {
        if let Some(sink) = &sink {
            (sink)(ProgressEvent::Start { task, total });
        }
        Self {
            task,
            total,
            completed: AtomicUsize::new(0),
            sink,
        }
    }

    pub fn advance(&self, amount: usize) {
        let completed = self.completed.fetch_add(amount, Ordering::Relaxed) + amount;
        if let Some(sink) = &self.sink {
            (sink)(ProgressEvent::Advance {
                task: self.task,
                completed,
                total: self.total,
            });
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        if let Some(sink) = &self.sink {
            (sink)(ProgressEvent::Finish { task: self.task });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn counter_accumulates_across_threads() {
        let progress = Progress::new("test", 100, None);
        crate::parallel::for_each_mut(&mut vec![0u8; 100], true, |_, _| progress.advance(1));
        assert_eq!(progress.completed(), 100);
    }

    #[test]
    fn sink_sees_start_and_finish() {
        let events: Arc<Mutex<Vec<String>>> = Arc::default();
        let log = Arc::clone(&events);
        let sink: ProgressSink = Arc::new(move |event| {
            let tag = match event {
                ProgressEvent::Start { .. } => "start",
                ProgressEvent::Advance { .. } => "advance",
                ProgressEvent::Finish { .. } => "finish",
            };
            log.lock().expect("lock").push(tag.to_string());
        });
        let progress = Progress::new("test", 2, Some(sink));
        progress.advance(2);
        progress.finish();
        let events = events.lock().expect("lock");
        assert_eq!(events.first().map(String::as_str), Some("start"));
        assert_eq!(events.last().map(String::as_str), Some("finish"));
    }
}

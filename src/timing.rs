//! Capture timing controller: a cooperative scheduler that owns every pending
//! timer for the current session and reports ticks, fires, and elapsed delays
//! into the engine's event queue. It never touches the camera or the store.

use crate::events::{EngineEvent, TimerEvent, TimerEventKind, WaitKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct TimingController {
    tx: mpsc::UnboundedSender<EngineEvent>,
    /// Beat between the final tick and the fire event
    grace: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl TimingController {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>, grace: Duration) -> Self {
        Self {
            tx,
            grace,
            tasks: Vec::new(),
        }
    }

    /// Emit `Tick { remaining }` once per second from `seconds` down to 0,
    /// then exactly one `Fire` after the grace delay.
    pub fn start_countdown(&mut self, epoch: u64, seconds: u32) {
        debug!("Starting {}s countdown (epoch {})", seconds, epoch);
        let tx = self.tx.clone();
        let grace = self.grace;

        self.track(tokio::spawn(async move {
            let mut remaining = seconds;
            loop {
                let event = TimerEvent {
                    epoch,
                    kind: TimerEventKind::Tick { remaining },
                };
                if tx.send(EngineEvent::Timer(event)).is_err() {
                    return;
                }
                if remaining == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
            }

            tokio::time::sleep(grace).await;
            let _ = tx.send(EngineEvent::Timer(TimerEvent {
                epoch,
                kind: TimerEventKind::Fire,
            }));
        }));
    }

    /// Emit a single `Elapsed { kind }` after `duration`
    pub fn after(&mut self, epoch: u64, kind: WaitKind, duration: Duration) {
        debug!("Scheduling {:?} wait of {:?} (epoch {})", kind, duration, epoch);
        let tx = self.tx.clone();

        self.track(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(EngineEvent::Timer(TimerEvent {
                epoch,
                kind: TimerEventKind::Elapsed { kind },
            }));
        }));
    }

    /// Stop every pending timer. Idempotent; safe to call with none armed.
    pub fn cancel_all(&mut self) {
        if !self.tasks.is_empty() {
            debug!("Canceling {} pending timer(s)", self.tasks.len());
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(handle);
    }
}

impl Drop for TimingController {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::Timer(timer) = event {
                events.push(timer);
            }
        }
        events
    }

    fn fire_count(events: &[TimerEvent]) -> usize {
        events
            .iter()
            .filter(|e| e.kind == TimerEventKind::Fire)
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_then_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timing = TimingController::new(tx, Duration::from_millis(500));

        timing.start_countdown(7, 3);
        tokio::time::sleep(Duration::from_secs(10)).await;

        let events = drain(&mut rx);
        let ticks: Vec<u32> = events
            .iter()
            .filter_map(|e| match e.kind {
                TimerEventKind::Tick { remaining } => Some(remaining),
                _ => None,
            })
            .collect();

        assert_eq!(ticks, vec![3, 2, 1, 0]);
        assert_eq!(fire_count(&events), 1, "exactly one fire per start_countdown");
        assert!(events.iter().all(|e| e.epoch == 7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_waits_for_grace_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timing = TimingController::new(tx, Duration::from_millis(500));

        // final tick lands at 1s, the fire 500ms later
        timing.start_countdown(1, 1);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        let before = drain(&mut rx);
        assert!(before
            .iter()
            .any(|e| e.kind == TimerEventKind::Tick { remaining: 0 }));
        assert_eq!(fire_count(&before), 0, "fire must wait out the grace delay");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fire_count(&drain(&mut rx)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_emits_single_elapsed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timing = TimingController::new(tx, Duration::from_millis(500));

        timing.after(2, WaitKind::DisplayHold, Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(3)).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].epoch, 2);
        assert_eq!(
            events[0].kind,
            TimerEventKind::Elapsed {
                kind: WaitKind::DisplayHold
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_pending_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timing = TimingController::new(tx, Duration::from_millis(500));

        timing.start_countdown(3, 5);
        timing.after(3, WaitKind::InterShot, Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(1)).await;
        drain(&mut rx);

        timing.cancel_all();
        timing.cancel_all(); // idempotent

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(
            drain(&mut rx).is_empty(),
            "no events may arrive after cancel_all"
        );
    }
}

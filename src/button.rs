//! the single push button: a monitor thread turning the pin into
//! [`ButtonSignal`]s and a handler deciding what each press means

use std::{
    ops::ControlFlow,
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use embedded_hal::digital::InputPin;
use log::{info, warn};

use crate::{
    communication::{ButtonEvent, ButtonSignal, Request},
    error::{Error, Result},
    scheduler::{AnnouncementScheduler, BackgroundTask},
};

/// resolution of the hold measurement
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// holds at least this long ask to shut down
pub const LONG_PRESS: Duration = Duration::from_secs(3);
/// time left after the release to confirm a shutdown
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(5);
const EDGE_POLL: Duration = Duration::from_millis(10);

const CONFIRM_QUESTION: &str = "Wanna shut me down?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Short,
    Long,
}

impl ButtonEvent {
    #[must_use]
    pub fn kind(&self) -> PressKind {
        if self.press_duration < LONG_PRESS {
            PressKind::Short
        } else {
            PressKind::Long
        }
    }
}

/// samples the button every [`POLL_INTERVAL`] until it is released or
/// [`LONG_PRESS`] is reached. the result is the time of the last sample that
/// still saw the button down.
pub fn measure_hold(
    mut is_pressed: impl FnMut() -> Result<bool>,
    mut sleep: impl FnMut(Duration),
) -> Result<Duration> {
    let mut elapsed = Duration::ZERO;
    let mut held = Duration::ZERO;
    while held < LONG_PRESS && is_pressed()? {
        held = elapsed;
        sleep(POLL_INTERVAL);
        elapsed += POLL_INTERVAL;
    }
    Ok(held)
}

fn is_pressed<P: InputPin>(pin: &mut P) -> Result<bool> {
    pin.is_high().map_err(|e| Error::Hardware(format!("button: {e:?}")))
}

/// watches the button pin on its own thread
#[derive(Debug)]
pub struct ButtonMonitor;

impl ButtonMonitor {
    /// polls `pin` (high while pressed) and reports every press on `signals`.
    /// the task ends when the receiver is gone or it is cancelled.
    pub fn spawn<P>(mut pin: P, signals: Sender<ButtonSignal>) -> Result<BackgroundTask<Result<()>>>
    where
        P: InputPin + Send + 'static,
    {
        BackgroundTask::spawn("button-monitor", move |cancel| {
            let mut was_pressed = false;
            while !cancel.is_cancelled() {
                let pressed = is_pressed(&mut pin)?;
                if pressed && !was_pressed {
                    if signals.send(ButtonSignal::Pressed).is_err() {
                        return Ok(());
                    }
                    let held = measure_hold(|| is_pressed(&mut pin), thread::sleep)?;
                    if signals.send(ButtonSignal::Held(ButtonEvent::new(held))).is_err() {
                        return Ok(());
                    }
                    while is_pressed(&mut pin)? && !cancel.is_cancelled() {
                        thread::sleep(EDGE_POLL);
                    }
                    if signals.send(ButtonSignal::Released).is_err() {
                        return Ok(());
                    }
                    was_pressed = false;
                    continue;
                }
                was_pressed = pressed;
                thread::sleep(EDGE_POLL);
            }
            Ok(())
        })
    }
}

/// what the confirmation flow reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmInput {
    LongPress,
    Released,
    Pressed,
    Tick,
}

/// shutdown confirmation after a long press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmState {
    Idle,
    AwaitingRelease,
    ConfirmWindow { deadline: Instant },
    Confirmed,
    TimedOut,
}

impl ConfirmState {
    #[must_use]
    pub fn next(self, input: ConfirmInput, now: Instant) -> Self {
        match (self, input) {
            (Self::Idle, ConfirmInput::LongPress) => Self::AwaitingRelease,
            (Self::AwaitingRelease, ConfirmInput::Released) => Self::ConfirmWindow {
                deadline: now + CONFIRM_WINDOW,
            },
            (Self::ConfirmWindow { deadline }, _) if now >= deadline => Self::TimedOut,
            (Self::ConfirmWindow { .. }, ConfirmInput::Pressed) => Self::Confirmed,
            (state, _) => state,
        }
    }

    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::AwaitingRelease | Self::ConfirmWindow { .. })
    }
}

/// turns button signals into requests for the alarm loop. signals are
/// handled one at a time, so a press during a confirmation belongs to that
/// confirmation and nothing else.
pub struct ButtonHandler {
    signals: Receiver<ButtonSignal>,
    scheduler: Arc<AnnouncementScheduler>,
    requests: Sender<Request>,
    /// the press that is being handled only silenced the speaker
    skip_current_press: bool,
}

impl ButtonHandler {
    #[must_use]
    pub const fn new(
        signals: Receiver<ButtonSignal>,
        scheduler: Arc<AnnouncementScheduler>,
        requests: Sender<Request>,
    ) -> Self {
        Self {
            signals,
            scheduler,
            requests,
            skip_current_press: false,
        }
    }

    pub fn spawn(self) -> Result<BackgroundTask<Result<()>>> {
        BackgroundTask::spawn("button-handler", move |_| {
            self.run();
            Ok(())
        })
    }

    /// handles signals until the monitor or the alarm loop goes away
    pub fn run(mut self) {
        while let Ok(signal) = self.signals.recv() {
            if self.handle(signal).is_break() {
                break;
            }
        }
        info!("button handler stopped");
    }

    fn handle(&mut self, signal: ButtonSignal) -> ControlFlow<()> {
        match signal {
            ButtonSignal::Pressed => {
                self.skip_current_press = self.silence();
                ControlFlow::Continue(())
            }
            ButtonSignal::Held(event) => {
                if std::mem::take(&mut self.skip_current_press) {
                    return ControlFlow::Continue(());
                }
                info!(
                    "button held for {:.1}s, {:?} press",
                    event.press_duration_seconds(),
                    event.kind()
                );
                match event.kind() {
                    PressKind::Short => self.request(Request::DescribeNextAlarm),
                    PressKind::Long => self.confirm_shutdown(),
                }
            }
            ButtonSignal::Released => ControlFlow::Continue(()),
        }
    }

    /// stops whatever is audible, true if there was something
    fn silence(&self) -> bool {
        let sound = self.scheduler.sound();
        if !sound.is_active() && !self.scheduler.is_busy() {
            return false;
        }
        info!("button pressed, stopping sound");
        self.scheduler.cancel_all();
        sound.stop();
        true
    }

    fn confirm_shutdown(&mut self) -> ControlFlow<()> {
        if let Err(e) = self.scheduler.say(CONFIRM_QUESTION.to_string()) {
            warn!("couldn't ask for confirmation: {e}");
        }
        let mut state = ConfirmState::Idle.next(ConfirmInput::LongPress, Instant::now());
        while state.is_pending() {
            let input = match self.signals.recv_timeout(POLL_INTERVAL) {
                Ok(ButtonSignal::Pressed) => {
                    // its Held and Released belong to the confirmation
                    self.skip_current_press = true;
                    ConfirmInput::Pressed
                }
                Ok(ButtonSignal::Released) => ConfirmInput::Released,
                Ok(ButtonSignal::Held(_)) | Err(RecvTimeoutError::Timeout) => ConfirmInput::Tick,
                Err(RecvTimeoutError::Disconnected) => return ControlFlow::Break(()),
            };
            state = state.next(input, Instant::now());
        }
        if state == ConfirmState::Confirmed {
            info!("shutdown confirmed");
            self.request(Request::Shutdown)
        } else {
            info!("shutdown not confirmed");
            ControlFlow::Continue(())
        }
    }

    fn request(&self, request: Request) -> ControlFlow<()> {
        if self.requests.send(request).is_err() {
            warn!("alarm loop gone, dropping {request:?}");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

impl std::fmt::Debug for ButtonHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ButtonHandler")
            .field("skip_current_press", &self.skip_current_press)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        sync::{atomic::Ordering, mpsc},
    };

    use super::*;
    use crate::testing::{offline_scheduler, wait_idle, Recorder};

    /// hold measured for a button that is down for `down`
    fn hold(down: Duration) -> Duration {
        let clock = Cell::new(Duration::ZERO);
        measure_hold(
            || Ok(clock.get() < down),
            |step| clock.set(clock.get() + step),
        )
        .unwrap()
    }

    #[test]
    fn short_holds_are_short_presses() {
        let held = hold(Duration::from_millis(2500));
        assert_eq!(held, Duration::from_millis(2400));
        assert_eq!(ButtonEvent::new(held).kind(), PressKind::Short);
    }

    #[test]
    fn three_seconds_exactly_is_still_short() {
        let held = hold(Duration::from_secs(3));
        assert_eq!(ButtonEvent::new(held).kind(), PressKind::Short);
    }

    #[test]
    fn longer_holds_stop_measuring_at_the_cap() {
        assert_eq!(hold(Duration::from_millis(3050)), LONG_PRESS);
        let held = hold(Duration::from_secs(4));
        assert_eq!(held, LONG_PRESS);
        assert_eq!(ButtonEvent::new(held).kind(), PressKind::Long);
    }

    #[test]
    fn released_button_measures_nothing() {
        assert_eq!(hold(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn confirmation_needs_release_then_press() {
        let start = Instant::now();
        let state = ConfirmState::Idle.next(ConfirmInput::LongPress, start);
        assert_eq!(state, ConfirmState::AwaitingRelease);
        // still holding from the long press
        assert_eq!(state.next(ConfirmInput::Pressed, start), state);

        let window = state.next(ConfirmInput::Released, start);
        assert_eq!(
            window,
            ConfirmState::ConfirmWindow {
                deadline: start + CONFIRM_WINDOW
            }
        );
        let later = start + Duration::from_secs(2);
        assert_eq!(window.next(ConfirmInput::Tick, later), window);
        assert_eq!(
            window.next(ConfirmInput::Pressed, later),
            ConfirmState::Confirmed
        );
    }

    #[test]
    fn confirmation_times_out() {
        let start = Instant::now();
        let window = ConfirmState::AwaitingRelease.next(ConfirmInput::Released, start);
        let late = start + CONFIRM_WINDOW;
        assert_eq!(window.next(ConfirmInput::Tick, late), ConfirmState::TimedOut);
        assert_eq!(window.next(ConfirmInput::Pressed, late), ConfirmState::TimedOut);
        assert!(!ConfirmState::TimedOut.is_pending());
    }

    fn handler(sound: &Arc<Recorder>) -> (Sender<ButtonSignal>, Receiver<Request>, Arc<AnnouncementScheduler>) {
        let scheduler = Arc::new(offline_scheduler(sound));
        let (signal_tx, signal_rx) = mpsc::channel();
        let (request_tx, request_rx) = mpsc::channel();
        ButtonHandler::new(signal_rx, Arc::clone(&scheduler), request_tx)
            .spawn()
            .unwrap();
        (signal_tx, request_rx, scheduler)
    }

    fn press(signals: &Sender<ButtonSignal>, held: Duration) {
        signals.send(ButtonSignal::Pressed).unwrap();
        signals
            .send(ButtonSignal::Held(ButtonEvent::new(held)))
            .unwrap();
        signals.send(ButtonSignal::Released).unwrap();
    }

    #[test]
    fn short_press_asks_for_the_next_alarm() {
        let sound = Arc::new(Recorder::default());
        let (signals, requests, _scheduler) = handler(&sound);
        press(&signals, Duration::from_secs(1));
        assert_eq!(
            requests.recv_timeout(Duration::from_secs(1)),
            Ok(Request::DescribeNextAlarm)
        );
    }

    #[test]
    fn press_while_playing_only_stops_the_sound() {
        let sound = Arc::new(Recorder::default());
        sound.active.store(true, Ordering::SeqCst);
        let (signals, requests, _scheduler) = handler(&sound);
        press(&signals, Duration::from_secs(1));
        assert!(requests.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(sound.stops.load(Ordering::SeqCst), 1);
        assert!(!sound.active.load(Ordering::SeqCst));
    }

    #[test]
    fn confirmed_long_press_requests_shutdown() {
        let sound = Arc::new(Recorder::default());
        let (signals, requests, scheduler) = handler(&sound);
        press(&signals, LONG_PRESS);
        press(&signals, Duration::from_millis(200));
        assert_eq!(
            requests.recv_timeout(Duration::from_secs(1)),
            Ok(Request::Shutdown)
        );
        // the confirming press is not a short press of its own
        assert!(requests.recv_timeout(Duration::from_millis(300)).is_err());
        wait_idle(&scheduler);
        assert_eq!(sound.heard(), vec![format!("say {CONFIRM_QUESTION}")]);
    }
}

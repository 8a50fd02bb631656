#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

use std::{
    process::Command,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::NaiveDateTime;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{error, info, warn};

use alarm::AlarmConfig;
use button::{ButtonHandler, ButtonMonitor};
use communication::Request;
use config::Config;
use decision::{decide, Action, TickState};
use display::Display;
use light::{AmbientLightSampler, LightSensor};
use scheduler::{AnnouncementScheduler, BackgroundTask};
use settings::SettingsStore;
use time::TimeSource;

pub mod alarm;
pub mod announce;
pub mod button;
pub mod communication;
pub mod config;
pub mod content;
pub mod decision;
pub mod display;
pub mod error;
pub mod gpio;
pub mod light;
pub mod scheduler;
pub mod settings;
pub mod sound;
pub mod time;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// dot lit while the alarm is on
pub const ALARM_INDICATOR: usize = 3;
/// dot blinking once a second to show the loop is alive
pub const BLINK_INDICATOR: usize = 1;
/// charge readings per tick, the brightness window averages further
const LIGHT_READS_PER_TICK: u32 = 1;

const FAREWELL: &str = "O K. Bye!";
const CRASHED: &str = "Outsch!";

/// whether the loop keeps going after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    PowerOff,
}

/// the devices the clock drives
#[derive(Debug)]
pub struct Hardware<D, L, A> {
    pub display: D,
    pub light: L,
    /// high switches the amplifier on
    pub amplifier: A,
}

/// the main loop: once per tick it reads the time and the alarm settings,
/// decides whether to wake someone up, and refreshes display, amplifier
/// and brightness. speech and content run in the background so a tick
/// never waits on the network.
pub struct AlarmClock<D, L, A> {
    time: Arc<dyn TimeSource>,
    settings: SettingsStore,
    alarm: AlarmConfig,
    state: TickState,
    display: D,
    light: AmbientLightSampler<L>,
    amplifier: A,
    amplifier_on: Option<bool>,
    scheduler: Arc<AnnouncementScheduler>,
    requests: Receiver<Request>,
    request_tx: Sender<Request>,
    button_tasks: Vec<BackgroundTask<Result<()>>>,
    tick_interval: Duration,
    poweroff_command: Vec<String>,
    welcome_message: String,
}

impl<D: Display, L: LightSensor, A: OutputPin> AlarmClock<D, L, A> {
    pub fn new(
        config: &Config,
        settings: SettingsStore,
        time: Arc<dyn TimeSource>,
        scheduler: Arc<AnnouncementScheduler>,
        hardware: Hardware<D, L, A>,
    ) -> Self {
        let (request_tx, requests) = mpsc::channel();
        Self {
            time,
            settings,
            alarm: AlarmConfig::default(),
            state: TickState::default(),
            display: hardware.display,
            light: AmbientLightSampler::new(hardware.light, LIGHT_READS_PER_TICK),
            amplifier: hardware.amplifier,
            amplifier_on: None,
            scheduler,
            requests,
            request_tx,
            button_tasks: vec![],
            tick_interval: config.tick_interval(),
            poweroff_command: config.poweroff_command.clone(),
            welcome_message: config.welcome_message.clone(),
        }
    }

    /// starts watching the button on `pin`, high while pressed
    pub fn attach_button<P>(&mut self, pin: P) -> Result<()>
    where
        P: InputPin + Send + 'static,
    {
        let (signal_tx, signals) = mpsc::channel();
        self.button_tasks.push(ButtonMonitor::spawn(pin, signal_tx)?);
        let handler = ButtonHandler::new(signals, Arc::clone(&self.scheduler), self.request_tx.clone());
        self.button_tasks.push(handler.spawn()?);
        Ok(())
    }

    /// hands out a way to make requests without a button
    #[must_use]
    pub fn request_sender(&self) -> Sender<Request> {
        self.request_tx.clone()
    }

    #[must_use]
    pub const fn alarm(&self) -> &AlarmConfig {
        &self.alarm
    }

    #[must_use]
    pub const fn state(&self) -> &TickState {
        &self.state
    }

    #[must_use]
    pub const fn display(&self) -> &D {
        &self.display
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Arc<AnnouncementScheduler> {
        &self.scheduler
    }

    /// amplifier off, startup animation and the welcome message
    pub fn start(&mut self) -> Result<()> {
        info!("starting up");
        self.set_amplifier(false)?;
        self.display.startup_animation()?;
        self.set_amplifier(true)?;
        self.scheduler.say(self.welcome_message.clone())
    }

    /// ticks until a confirmed shutdown or an error
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        loop {
            let started = Instant::now();
            if self.tick()? == Flow::PowerOff {
                return Ok(());
            }
            if let Some(rest) = self.tick_interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    pub fn tick(&mut self) -> Result<Flow> {
        let now = self.time.now();
        if self.handle_requests(now)? == Flow::PowerOff {
            return Ok(Flow::PowerOff);
        }
        self.reload_settings(now)?;

        let (action, state) = decide(&self.alarm, self.state, now);
        self.state = state;
        match action {
            Action::Trigger => {
                info!("alarm going off at {}", now.format("%A %H:%M"));
                self.scheduler.announce_and_play(&self.alarm, now)?;
            }
            Action::ReassertNetwork => self.scheduler.reassert_network()?,
            Action::Idle => {}
        }

        self.render(now)?;
        // downloads may still be in use while anything is in flight
        if !self.scheduler.is_busy() {
            self.scheduler
                .resolver()
                .delete_stale_audio(state.minutes_to_alarm, self.alarm.active)?;
        }
        let audible = self.scheduler.sound().is_active() || self.scheduler.is_busy();
        self.set_amplifier(audible)?;

        let level = self.light.sample()?;
        if let Some(brightness) = self.state.record_brightness(level) {
            self.display.set_brightness(brightness);
        }

        self.check_button()?;
        Ok(Flow::Continue)
    }

    fn handle_requests(&mut self, now: NaiveDateTime) -> Result<Flow> {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                Request::DescribeNextAlarm => {
                    let text = announce::describe_next_alarm(
                        self.alarm.active,
                        self.alarm.days,
                        self.alarm.time,
                        now,
                    );
                    info!("next alarm: {text}");
                    self.scheduler.say(text)?;
                }
                Request::Shutdown => {
                    self.power_off()?;
                    return Ok(Flow::PowerOff);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn reload_settings(&mut self, now: NaiveDateTime) -> Result<()> {
        let Some(alarm) = self.settings.poll()? else {
            return Ok(());
        };
        info!("alarm settings changed: {alarm:?}");
        self.scheduler.sound().set_volume(alarm.volume);
        self.alarm = alarm;
        if self.alarm.test_alarm_requested {
            info!("test alarm requested");
            self.settings.set_test_alarm(false)?;
            self.alarm.test_alarm_requested = false;
            // counts as this minute's alarm
            self.state.just_played_alarm = true;
            self.scheduler.announce_and_play(&self.alarm, now)?;
        }
        Ok(())
    }

    fn render(&mut self, now: NaiveDateTime) -> Result<()> {
        self.display.clear();
        self.display.show_time(now.time());
        self.display.set_indicator(ALARM_INDICATOR, self.alarm.active);
        self.display.set_indicator(BLINK_INDICATOR, self.state.blink_phase);
        self.display.write()
    }

    fn set_amplifier(&mut self, on: bool) -> Result<()> {
        if self.amplifier_on == Some(on) {
            return Ok(());
        }
        let result = if on {
            self.amplifier.set_high()
        } else {
            self.amplifier.set_low()
        };
        result.map_err(|e| Error::Hardware(format!("amplifier: {e:?}")))?;
        self.amplifier_on = Some(on);
        Ok(())
    }

    /// the button threads only end when something broke
    fn check_button(&mut self) -> Result<()> {
        let Some(index) = self.button_tasks.iter().position(BackgroundTask::is_finished) else {
            return Ok(());
        };
        let task = self.button_tasks.remove(index);
        let name = task.name();
        task.join()??;
        Err(Error::Hardware(format!("{name} stopped")))
    }

    /// says goodbye and powers the host off
    fn power_off(&mut self) -> Result<()> {
        info!("powering off");
        self.scheduler.cancel_all();
        let sound = Arc::clone(self.scheduler.sound());
        sound.stop();
        self.set_amplifier(true)?;
        if let Err(e) = sound.say(FAREWELL) {
            warn!("couldn't say goodbye: {e}");
        }
        self.set_amplifier(false)?;
        self.display.shutdown_animation()?;
        self.stop_button();
        let Some((program, args)) = self.poweroff_command.split_first() else {
            info!("no power-off command configured, just exiting");
            return Ok(());
        };
        let status = Command::new(program).args(args).status()?;
        if !status.success() {
            return Err(Error::Command {
                command: self.poweroff_command.join(" "),
                status,
            });
        }
        Ok(())
    }

    /// the last resort after a failed tick: stop all sound, say that
    /// something went wrong and leave the amplifier off. every step is best
    /// effort.
    pub fn emergency_stop(&mut self, cause: &Error) {
        error!("alarm clock crashed: {cause}");
        self.stop_button();
        self.scheduler.cancel_all();
        let sound = Arc::clone(self.scheduler.sound());
        sound.stop();
        self.amplifier_on = None;
        if let Err(e) = self.set_amplifier(true) {
            error!("couldn't switch the amplifier on: {e}");
        }
        if let Err(e) = sound.say(CRASHED) {
            error!("couldn't report the crash: {e}");
        }
        if let Err(e) = self.set_amplifier(false) {
            error!("couldn't switch the amplifier off: {e}");
        }
        if let Err(e) = self.display.error_animation() {
            error!("couldn't show the error animation: {e}");
        }
    }

    fn stop_button(&self) {
        for task in &self.button_tasks {
            task.cancel();
        }
    }
}

impl<D, L, A> Drop for AlarmClock<D, L, A> {
    fn drop(&mut self) {
        for task in &self.button_tasks {
            task.cancel();
        }
    }
}

impl<D, L, A> std::fmt::Debug for AlarmClock<D, L, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmClock")
            .field("settings", &self.settings)
            .field("alarm", &self.alarm)
            .field("state", &self.state)
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

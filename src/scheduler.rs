//! background work started by the alarm loop: spoken messages, the wake-up
//! sequence and the network check. every task runs on its own thread and
//! is tracked through a [`BackgroundTask`] handle, so the loop keeps
//! ticking while content downloads.

use std::{
    path::PathBuf,
    process::Command,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
};

use chrono::NaiveDateTime;
use log::{error, info, warn};

use crate::{
    alarm::{AlarmConfig, ContentKind},
    content::ContentResolver,
    error::{Error, Result},
    sound::Sound,
};

const DOWNLOAD_FAILED: &str = "Could not download the podcast. Playing offline music instead!";
const NOTHING_TO_PLAY: &str = "Sorry, I could not play anything.";

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// handle to work running on its own thread
#[derive(Debug)]
pub struct BackgroundTask<T> {
    name: &'static str,
    cancel: CancelToken,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    pub fn spawn<F>(name: &'static str, work: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) -> T + Send + 'static,
    {
        let cancel = CancelToken::default();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || work(token))?;
        Ok(Self {
            name,
            cancel,
            handle,
        })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// asks the task to stop at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// waits for the task and hands back its result
    pub fn join(self) -> Result<T> {
        let Self { name, handle, .. } = self;
        handle.join().map_err(|_| Error::TaskPanicked(name))
    }
}

/// what plays once the wake-up message is over
#[derive(Debug, Clone, PartialEq, Eq)]
enum Playback {
    File(PathBuf),
    Offline,
    Stream(String),
}

/// runs speech and wake-up content in the background, making sure the
/// two never talk over each other
pub struct AnnouncementScheduler {
    sound: Arc<dyn Sound>,
    resolver: Arc<ContentResolver>,
    probe_url: String,
    network_reset_command: Vec<String>,
    audio: Mutex<Vec<BackgroundTask<()>>>,
    network: Mutex<Option<BackgroundTask<()>>>,
}

impl AnnouncementScheduler {
    #[must_use]
    pub fn new(
        sound: Arc<dyn Sound>,
        resolver: Arc<ContentResolver>,
        probe_url: String,
        network_reset_command: Vec<String>,
    ) -> Self {
        Self {
            sound,
            resolver,
            probe_url,
            network_reset_command,
            audio: Mutex::new(vec![]),
            network: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn sound(&self) -> &Arc<dyn Sound> {
        &self.sound
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<ContentResolver> {
        &self.resolver
    }

    /// speaks `text` without blocking the caller
    pub fn say(&self, text: String) -> Result<()> {
        let sound = Arc::clone(&self.sound);
        self.spawn_audio("say", move |_| {
            if let Err(e) = sound.say(&text) {
                warn!("couldn't say `{text}`: {e}");
            }
        })
    }

    /// starts the wake-up sequence for `alarm`: the wake-up message, then
    /// its content. content is fetched while the message is spoken, but
    /// playback only starts after the message has finished.
    pub fn announce_and_play(&self, alarm: &AlarmConfig, now: NaiveDateTime) -> Result<()> {
        let message = alarm.wake_up_message(now);
        let kind = alarm.content_kind;
        let url = match kind {
            ContentKind::Podcast => alarm.podcast_url.clone(),
            ContentKind::Stream => alarm.stream_url.clone(),
            ContentKind::LocalAudio => String::new(),
        };
        info!("waking up with {kind}");
        let sound = Arc::clone(&self.sound);
        let resolver = Arc::clone(&self.resolver);
        self.spawn_audio("wake-up", move |cancel| {
            if let Err(e) = wake_up(&sound, &resolver, kind, &url, message, &cancel) {
                error!("wake-up failed: {e}");
                if let Err(e) = sound.say(NOTHING_TO_PLAY) {
                    error!("couldn't even apologise: {e}");
                }
            }
        })
    }

    /// checks the internet connection in the background and runs the reset
    /// command if it is down. does nothing if a check is still running.
    pub fn reassert_network(&self) -> Result<()> {
        let mut network = self.network.lock().unwrap_or_else(PoisonError::into_inner);
        if network.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }
        let resolver = Arc::clone(&self.resolver);
        let probe_url = self.probe_url.clone();
        let reset = self.network_reset_command.clone();
        *network = Some(BackgroundTask::spawn("network", move |_| {
            let Err(e) = resolver.fetcher().probe(&probe_url) else {
                return;
            };
            warn!("internet connection lost: {e}");
            if let Some((program, args)) = reset.split_first() {
                match Command::new(program).args(args).status() {
                    Ok(status) if status.success() => info!("ran network reset `{program}`"),
                    Ok(status) => warn!("network reset `{program}` exited with {status}"),
                    Err(e) => warn!("couldn't run network reset `{program}`: {e}"),
                }
            }
        })?);
        Ok(())
    }

    /// true while speech or a wake-up sequence is still in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        let mut audio = self.audio.lock().unwrap_or_else(PoisonError::into_inner);
        reap(&mut audio);
        !audio.is_empty()
    }

    /// cancels everything audible that is in flight
    pub fn cancel_all(&self) {
        let audio = self.audio.lock().unwrap_or_else(PoisonError::into_inner);
        for task in audio.iter() {
            info!("cancelling {}", task.name());
            task.cancel();
        }
    }

    fn spawn_audio<F>(&self, name: &'static str, work: F) -> Result<()>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let mut audio = self.audio.lock().unwrap_or_else(PoisonError::into_inner);
        reap(&mut audio);
        audio.push(BackgroundTask::spawn(name, work)?);
        Ok(())
    }
}

/// drops finished tasks, logging the ones that panicked
fn reap(tasks: &mut Vec<BackgroundTask<()>>) {
    let (done, running): (Vec<_>, Vec<_>) = tasks.drain(..).partition(BackgroundTask::is_finished);
    *tasks = running;
    for task in done {
        if let Err(e) = task.join() {
            error!("{e}");
        }
    }
}

fn wake_up(
    sound: &Arc<dyn Sound>,
    resolver: &ContentResolver,
    kind: ContentKind,
    url: &str,
    message: String,
    cancel: &CancelToken,
) -> Result<()> {
    let speech = {
        let sound = Arc::clone(sound);
        BackgroundTask::spawn("wake-up-message", move |_| sound.say(&message))?
    };

    let mut notices = vec![];
    let mut announce = |text: &str| notices.push(text.to_string());
    let playback = match kind {
        ContentKind::Podcast => {
            let feed = resolver.resolve(kind, url, &mut announce);
            match resolver.download_latest_episode(&feed) {
                Ok(path) => Playback::File(path),
                Err(e) => {
                    warn!("couldn't download an episode of {feed}: {e}");
                    announce(DOWNLOAD_FAILED);
                    Playback::Offline
                }
            }
        }
        ContentKind::Stream => Playback::Stream(resolver.resolve(kind, url, &mut announce)),
        ContentKind::LocalAudio => Playback::Offline,
    };

    // the output is shared, playback must wait for the message
    if let Err(e) = speech.join()? {
        warn!("couldn't say the wake-up message: {e}");
    }
    for notice in &notices {
        if cancel.is_cancelled() {
            break;
        }
        sound.say(notice)?;
    }
    if cancel.is_cancelled() {
        info!("wake-up cancelled before playback");
        return Ok(());
    }
    match playback {
        Playback::File(path) => sound.play_file(&path),
        Playback::Offline => sound.play_offline_audio(),
        Playback::Stream(url) => sound.play_stream(&url),
    }
}

impl std::fmt::Debug for AnnouncementScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncementScheduler")
            .field("resolver", &self.resolver)
            .field("probe_url", &self.probe_url)
            .finish_non_exhaustive()
    }
}

//! fakes shared by the unit tests

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    alarm::Volume,
    content::{ContentResolver, Fetcher},
    error::Result,
    scheduler::AnnouncementScheduler,
    sound::Sound,
};

/// records what would have been heard
#[derive(Default)]
pub struct Recorder {
    heard: Mutex<Vec<String>>,
    pub speech_time: Duration,
    pub active: AtomicBool,
    pub stops: AtomicUsize,
}

impl Recorder {
    pub fn with_speech_time(speech_time: Duration) -> Self {
        Self {
            speech_time,
            ..Self::default()
        }
    }

    pub fn heard(&self) -> Vec<String> {
        self.heard.lock().unwrap().clone()
    }

    fn push(&self, what: String) {
        self.heard.lock().unwrap().push(what);
    }
}

impl Sound for Recorder {
    fn say(&self, text: &str) -> Result<()> {
        thread::sleep(self.speech_time);
        self.push(format!("say {text}"));
        Ok(())
    }

    fn play_file(&self, path: &Path) -> Result<()> {
        let name = path.file_name().unwrap().to_string_lossy();
        self.push(format!("file {name}"));
        Ok(())
    }

    fn play_offline_audio(&self) -> Result<()> {
        self.push("offline".to_string());
        Ok(())
    }

    fn play_stream(&self, url: &str) -> Result<()> {
        self.push(format!("stream {url}"));
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }

    fn set_volume(&self, _volume: Volume) {}

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// every request fails at once
pub struct Offline;

impl Fetcher for Offline {
    fn fetch(&self, url: &str, _dir: &Path) -> Result<PathBuf> {
        Err(std::io::Error::new(std::io::ErrorKind::NotConnected, url.to_string()).into())
    }

    fn probe(&self, url: &str) -> Result<()> {
        self.fetch(url, Path::new(".")).map(|_| ())
    }
}

pub fn offline_scheduler(sound: &Arc<Recorder>) -> AnnouncementScheduler {
    let resolver = ContentResolver::new(
        Arc::new(Offline),
        std::env::temp_dir(),
        vec![],
        "http://default.example/feed".to_string(),
        "http://default.example:8000".to_string(),
    );
    AnnouncementScheduler::new(
        Arc::clone(sound) as Arc<dyn Sound>,
        Arc::new(resolver),
        "http://probe.example".to_string(),
        vec![],
    )
}

pub fn wait_idle(scheduler: &AnnouncementScheduler) {
    let start = Instant::now();
    while scheduler.is_busy() {
        assert!(start.elapsed() < Duration::from_secs(5), "scheduler stuck");
        thread::sleep(Duration::from_millis(10));
    }
}

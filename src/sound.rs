use std::{
    fs::File,
    io::{BufReader, Cursor},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{Mutex, PoisonError},
};

use log::{debug, info, warn};
use rodio::{Decoder, Sink};

use crate::{
    alarm::Volume,
    config::Config,
    content::is_audio_file,
    error::{Error, Result},
};

/// the audio output. speech and playback share one device, so an
/// implementation must never have both audible at once.
pub trait Sound: Send + Sync {
    /// speaks `text` and returns once it has been heard
    fn say(&self, text: &str) -> Result<()>;
    /// starts playing an audio file and returns right away
    fn play_file(&self, path: &Path) -> Result<()>;
    /// starts the configured offline wake-up music
    fn play_offline_audio(&self) -> Result<()>;
    /// starts an internet stream
    fn play_stream(&self, url: &str) -> Result<()>;
    /// silences speech and playback immediately
    fn stop(&self);
    fn set_volume(&self, volume: Volume);
    fn is_active(&self) -> bool;
}

/// rodio backed output. everything goes through one sink so speech and
/// files queue behind each other; streams play through an external player.
pub struct Speaker {
    sink: Sink,
    tts_command: Vec<String>,
    stream_player: Vec<String>,
    music_dir: PathBuf,
    stream: Mutex<Option<Child>>,
}

impl Speaker {
    #[must_use]
    pub fn new(sink: Sink, config: &Config) -> Self {
        Self {
            sink,
            tts_command: config.tts_command.clone(),
            stream_player: config.stream_player.clone(),
            music_dir: config.music_dir.clone(),
            stream: Mutex::new(None),
        }
    }

    fn stop_stream(&self) {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = stream.take() {
            if let Err(e) = child.kill() {
                debug!("stream player already gone: {e}");
            }
            // reap it so it doesn't linger as a zombie
            let _ = child.wait();
        }
    }

    fn stream_running(&self) -> bool {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        match stream.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(_) => {
                *stream = None;
                false
            }
            None => false,
        }
    }

    fn offline_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = std::fs::read_dir(&self.music_dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && is_audio_file(path))
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }
}

fn split_command<'a>(command: &'a [String], what: &'static str) -> Result<(&'a String, &'a [String])> {
    command.split_first().ok_or(Error::EmptyCommand(what))
}

impl Sound for Speaker {
    fn say(&self, text: &str) -> Result<()> {
        let (program, args) = split_command(&self.tts_command, "tts_command")?;
        debug!("saying: {text}");
        let output = Command::new(program)
            .args(args)
            .arg(text)
            .stderr(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(Error::Command {
                command: program.clone(),
                status: output.status,
            });
        }
        self.sink.append(Decoder::new(Cursor::new(output.stdout))?);
        self.sink.play();
        self.sink.sleep_until_end();
        Ok(())
    }

    fn play_file(&self, path: &Path) -> Result<()> {
        info!("playing {}", path.display());
        let file = BufReader::new(File::open(path)?);
        self.sink.append(Decoder::new(file)?);
        self.sink.play();
        Ok(())
    }

    fn play_offline_audio(&self) -> Result<()> {
        let files = self.offline_files()?;
        if files.is_empty() {
            return Err(Error::NoOfflineAudio(self.music_dir.clone()));
        }
        for file in &files {
            self.play_file(file)?;
        }
        Ok(())
    }

    fn play_stream(&self, url: &str) -> Result<()> {
        self.stop_stream();
        let (program, args) = split_command(&self.stream_player, "stream_player")?;
        info!("streaming {url}");
        let child = Command::new(program)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        *self.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        Ok(())
    }

    fn stop(&self) {
        if self.is_active() {
            info!("stopping sound");
        }
        self.sink.stop();
        self.stop_stream();
    }

    fn set_volume(&self, volume: Volume) {
        if self.stream.lock().unwrap_or_else(PoisonError::into_inner).is_some() {
            warn!("volume change only applies to speech and files, not the running stream");
        }
        self.sink.set_volume(volume.gain());
    }

    fn is_active(&self) -> bool {
        !self.sink.empty() || self.stream_running()
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

impl std::fmt::Debug for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Speaker")
            .field("tts_command", &self.tts_command)
            .field("stream_player", &self.stream_player)
            .field("music_dir", &self.music_dir)
            .finish_non_exhaustive()
    }
}

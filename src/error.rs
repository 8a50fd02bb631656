use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("couldn't read {path}: {source}")]
    File { path: PathBuf, source: io::Error },

    #[error("couldn't parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("couldn't serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed feed: {0}")]
    Feed(#[from] quick_xml::Error),

    #[error("feed has no playable episode")]
    NoEpisode,

    #[error("no audio files in {0}")]
    NoOfflineAudio(PathBuf),

    #[error("couldn't decode audio: {0}")]
    Decode(#[from] rodio::decoder::DecoderError),

    #[error("couldn't open audio output: {0}")]
    Stream(#[from] rodio::StreamError),

    #[error("gpio {pin}: {source}")]
    Gpio { pin: u32, source: io::Error },

    #[error("hardware failure: {0}")]
    Hardware(String),

    #[error("`{command}` exited with {status}")]
    Command {
        command: String,
        status: std::process::ExitStatus,
    },

    #[error("empty command line for {0}")]
    EmptyCommand(&'static str),

    #[error("no config directory available")]
    NoConfigDir,

    #[error("background task `{0}` panicked")]
    TaskPanicked(&'static str),
}

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{debug, info, warn};
use quick_xml::{events::Event, Reader};

use crate::{
    alarm::ContentKind,
    error::{Error, Result},
};

const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "ogg", "wav", "flac"];

/// minutes around the alarm in which downloads are kept
const KEEP_WINDOW_MINUTES: i32 = 10;

pub(crate) const BAD_PODCAST_URL: &str =
    "provided podcast url does not look like a proper url. Playing default podcast instead!";
pub(crate) const NO_EPISODE: &str =
    "Cant find any m p 3 file in the provided podcast url. Playing default podcast instead!";
pub(crate) const BAD_STREAM_URL: &str =
    "provided stream url does not look like a proper url. Playing default stream instead!";

/// network access used for feeds, episodes and the connectivity probe
pub trait Fetcher: Send + Sync {
    /// downloads `url` into `dir` and returns the local file
    fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf>;

    /// succeeds if `url` answers at all
    fn probe(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    probe_client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?,
            probe_client: reqwest::blocking::Client::builder()
                .timeout(probe_timeout)
                .build()?,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let url = with_scheme(url);
        let mut response = self.client.get(&url).send()?.error_for_status()?;
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name(&url));
        info!("downloading {url} to {}", path.display());
        let mut file = fs::File::create(&path)?;
        let size = response.copy_to(&mut file)?;
        debug!("downloaded {size} bytes");
        Ok(path)
    }

    fn probe(&self, url: &str) -> Result<()> {
        self.probe_client
            .get(with_scheme(url))
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

/// true for the prefixes a user is expected to paste
#[must_use]
pub fn has_url_scheme(url: &str) -> bool {
    ["http://", "https://", "www."]
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("www.") {
        format!("http://{url}")
    } else {
        url.to_string()
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// local name for a download, the last path segment of the url
fn file_name(url: &str) -> String {
    strip_query(url)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .map_or_else(|| "download".to_string(), ToString::to_string)
}

#[must_use]
pub fn is_audio_url(url: &str) -> bool {
    let path = strip_query(url).to_ascii_lowercase();
    AUDIO_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")))
}

pub(crate) fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// url of the first `<enclosure>` in a feed, the most recent episode for
/// any feed that lists newest first
pub fn first_enclosure(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"enclosure" => {
                if let Some(url) = e.try_get_attribute("url").map_err(quick_xml::Error::from)? {
                    let url = url.unescape_value().map_err(quick_xml::Error::from)?;
                    return Ok(Some(url.into_owned()));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// downloads outside the keep window are safe to delete: well before or
/// after any alarm, or with the alarm switched off
#[must_use]
pub const fn is_outside_keep_window(minutes_to_alarm: i32, alarm_active: bool) -> bool {
    minutes_to_alarm < -KEEP_WINDOW_MINUTES || minutes_to_alarm > KEEP_WINDOW_MINUTES || !alarm_active
}

/// turns the configured content source into something playable, falling
/// back to the defaults with a spoken notice
pub struct ContentResolver {
    fetcher: Arc<dyn Fetcher>,
    download_dir: PathBuf,
    purge_dirs: Vec<PathBuf>,
    default_podcast_url: String,
    default_stream_url: String,
}

impl ContentResolver {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        download_dir: PathBuf,
        purge_dirs: Vec<PathBuf>,
        default_podcast_url: String,
        default_stream_url: String,
    ) -> Self {
        Self {
            fetcher,
            download_dir,
            purge_dirs,
            default_podcast_url,
            default_stream_url,
        }
    }

    #[must_use]
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    #[must_use]
    pub fn default_podcast_url(&self) -> &str {
        &self.default_podcast_url
    }

    /// the url to play for `kind`. a url that is malformed, unreachable or
    /// has no episode is replaced by the default after one `announce`.
    pub fn resolve(&self, kind: ContentKind, url: &str, announce: &mut dyn FnMut(&str)) -> String {
        match kind {
            ContentKind::Podcast => self.resolve_podcast(url, announce),
            ContentKind::Stream if has_url_scheme(url) => url.to_string(),
            ContentKind::Stream => {
                warn!("stream url `{url}` is malformed, using default");
                announce(BAD_STREAM_URL);
                self.default_stream_url.clone()
            }
            ContentKind::LocalAudio => url.to_string(),
        }
    }

    fn resolve_podcast(&self, url: &str, announce: &mut dyn FnMut(&str)) -> String {
        if !has_url_scheme(url) {
            warn!("podcast url `{url}` is malformed, using default");
            announce(BAD_PODCAST_URL);
            return self.default_podcast_url.clone();
        }
        match self.latest_episode(url) {
            Ok(episode) => {
                debug!("latest episode of {url} is {episode}");
                url.to_string()
            }
            Err(e) => {
                warn!("no episode in podcast {url}, using default: {e}");
                announce(NO_EPISODE);
                self.default_podcast_url.clone()
            }
        }
    }

    /// url of the newest audio episode in the feed at `feed_url`
    pub fn latest_episode(&self, feed_url: &str) -> Result<String> {
        let feed = self.fetcher.fetch(feed_url, &self.download_dir)?;
        let xml = fs::read_to_string(&feed);
        if let Err(e) = fs::remove_file(&feed) {
            debug!("couldn't remove feed {}: {e}", feed.display());
        }
        match first_enclosure(&xml?)? {
            Some(episode) if is_audio_url(&episode) => Ok(episode),
            _ => Err(Error::NoEpisode),
        }
    }

    /// downloads the newest episode of `feed_url`
    pub fn download_latest_episode(&self, feed_url: &str) -> Result<PathBuf> {
        let episode = self.latest_episode(feed_url)?;
        self.fetcher.fetch(&episode, &self.download_dir)
    }

    /// deletes downloaded audio once the alarm is far enough away that
    /// nothing can be playing it. returns how many files went.
    pub fn delete_stale_audio(&self, minutes_to_alarm: i32, alarm_active: bool) -> Result<usize> {
        if !is_outside_keep_window(minutes_to_alarm, alarm_active) {
            return Ok(0);
        }
        let mut deleted = 0;
        for dir in &self.purge_dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let path = entry?.path();
                if path.is_file() && is_audio_file(&path) {
                    fs::remove_file(&path)?;
                    info!("deleted stale {}", path.display());
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

impl std::fmt::Debug for ContentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentResolver")
            .field("download_dir", &self.download_dir)
            .field("purge_dirs", &self.purge_dirs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io};

    use super::*;

    const DEFAULT_FEED: &str = "http://default.example/feed.rss";
    const DEFAULT_STREAM: &str = "http://default.example:8000";

    const FEED: &str = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
          <title>news</title>
          <item><title>new</title><enclosure url="http://cdn.example/new.mp3?x=1&amp;y=2" type="audio/mpeg"/></item>
          <item><title>old</title><enclosure url="http://cdn.example/old.mp3" type="audio/mpeg"/></item>
        </channel></rss>"#;

    /// serves canned bodies keyed by url
    struct Canned(HashMap<String, String>);

    impl Fetcher for Canned {
        fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf> {
            let body = self
                .0
                .get(url)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, url.to_string()))?;
            fs::create_dir_all(dir)?;
            let path = dir.join(file_name(url));
            fs::write(&path, body)?;
            Ok(path)
        }

        fn probe(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "smart_alarm_content_{name}_{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn resolver(name: &str, feeds: &[(&str, &str)]) -> ContentResolver {
        let dir = scratch(name);
        ContentResolver::new(
            Arc::new(Canned(
                feeds
                    .iter()
                    .map(|(url, body)| ((*url).to_string(), (*body).to_string()))
                    .collect(),
            )),
            dir.clone(),
            vec![dir],
            DEFAULT_FEED.to_string(),
            DEFAULT_STREAM.to_string(),
        )
    }

    fn resolve(resolver: &ContentResolver, kind: ContentKind, url: &str) -> (String, Vec<String>) {
        let mut said = vec![];
        let url = resolver.resolve(kind, url, &mut |text| said.push(text.to_string()));
        (url, said)
    }

    #[test]
    fn malformed_podcast_url_falls_back_with_one_notice() {
        let resolver = resolver("malformed", &[]);
        let (url, said) = resolve(&resolver, ContentKind::Podcast, "not-a-url");
        assert_eq!(url, DEFAULT_FEED);
        assert_eq!(said, vec![BAD_PODCAST_URL]);
    }

    #[test]
    fn good_feed_is_kept() {
        let resolver = resolver("good", &[("https://pod.example/feed", FEED)]);
        let (url, said) = resolve(&resolver, ContentKind::Podcast, "https://pod.example/feed");
        assert_eq!(url, "https://pod.example/feed");
        assert!(said.is_empty());
        assert_eq!(
            resolver.latest_episode("https://pod.example/feed").unwrap(),
            "http://cdn.example/new.mp3?x=1&y=2"
        );
    }

    #[test]
    fn feed_without_audio_falls_back() {
        let video = r#"<rss><channel><item><enclosure url="http://cdn.example/a.mp4"/></item></channel></rss>"#;
        let resolver = resolver("video", &[("http://pod.example/v", video)]);
        let (url, said) = resolve(&resolver, ContentKind::Podcast, "http://pod.example/v");
        assert_eq!(url, DEFAULT_FEED);
        assert_eq!(said, vec![NO_EPISODE]);
    }

    #[test]
    fn unreachable_feed_falls_back() {
        let resolver = resolver("unreachable", &[]);
        let (url, said) = resolve(&resolver, ContentKind::Podcast, "www.pod.example/feed");
        assert_eq!(url, DEFAULT_FEED);
        assert_eq!(said.len(), 1);
    }

    #[test]
    fn stream_url_is_checked_too() {
        let resolver = resolver("stream", &[]);
        assert_eq!(
            resolve(&resolver, ContentKind::Stream, "radio"),
            (DEFAULT_STREAM.to_string(), vec![BAD_STREAM_URL.to_string()])
        );
        assert_eq!(
            resolve(&resolver, ContentKind::Stream, "http://radio.example").0,
            "http://radio.example"
        );
    }

    #[test]
    fn episode_download_lands_in_download_dir() {
        let resolver = resolver(
            "download",
            &[
                ("http://pod.example/feed", FEED),
                ("http://cdn.example/new.mp3?x=1&y=2", "ID3"),
            ],
        );
        let path = resolver
            .download_latest_episode("http://pod.example/feed")
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "new.mp3");
        assert_eq!(fs::read_to_string(path).unwrap(), "ID3");
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(file_name("http://a.example/b/c.mp3?d=e"), "c.mp3");
        assert_eq!(file_name("http://a.example:8000/"), "download");
        assert!(is_audio_url("http://a.example/EP.MP3?token=1"));
        assert!(!is_audio_url("http://a.example/ep.mp4"));
        assert!(has_url_scheme("www.example.com"));
        assert!(!has_url_scheme("ftp://example.com"));
    }

    #[test]
    fn enclosure_without_url_is_skipped() {
        let xml = r#"<rss><item><enclosure/></item><item><enclosure url="http://x/y.ogg"/></item></rss>"#;
        assert_eq!(
            first_enclosure(xml).unwrap().as_deref(),
            Some("http://x/y.ogg")
        );
        assert_eq!(first_enclosure("<rss/>").unwrap(), None);
    }

    #[test]
    fn stale_audio_only_goes_outside_the_window() {
        let resolver = resolver("stale", &[]);
        let dir = scratch("stale");
        let files = ["a.mp3", "b.ogg", "notes.txt"].map(|name| dir.join(name));
        let create = || {
            for file in &files {
                fs::write(file, "x").unwrap();
            }
        };
        create();

        assert_eq!(resolver.delete_stale_audio(5, true).unwrap(), 0);
        assert_eq!(resolver.delete_stale_audio(-10, true).unwrap(), 0);
        assert!(files[0].exists());

        assert_eq!(resolver.delete_stale_audio(15, true).unwrap(), 2);
        assert!(!files[0].exists() && !files[1].exists());
        assert!(files[2].exists());

        create();
        assert_eq!(resolver.delete_stale_audio(0, false).unwrap(), 2);
        fs::remove_dir_all(dir).unwrap();
    }
}

use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use log::info;
use rodio::Sink;
use smart_alarm::{
    alarm::AlarmConfig,
    announce::describe_next_alarm,
    config::Config,
    content::{ContentResolver, HttpFetcher},
    display::ConsoleDisplay,
    gpio::SysfsPin,
    light::ChargeTimeSensor,
    scheduler::AnnouncementScheduler,
    settings::SettingsStore,
    sound::{Sound, Speaker},
    time::{LocalTime, TimeSource},
    AlarmClock, Hardware,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// device configuration, defaults to the user config directory
    #[clap(long, short)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write the default configuration and alarm settings
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// print when the alarm goes off next
    Next,
    /// make the running alarm clock go off once
    Test,
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_file_logger::init_logger!("smart_alarm").expect("couldn't initialize logger");

    let args = Args::parse();
    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    match args.command {
        Some(Command::Init { force }) => init(&config_path, force),
        Some(Command::Next) => {
            let config = Config::load_or_default(&config_path)?;
            let alarm = SettingsStore::new(config.alarm_path(&config_path)).load()?;
            println!(
                "{}",
                describe_next_alarm(alarm.active, alarm.days, alarm.time, LocalTime.now())
            );
            Ok(())
        }
        Some(Command::Test) => {
            let config = Config::load_or_default(&config_path)?;
            let mut settings = SettingsStore::new(config.alarm_path(&config_path));
            settings.set_test_alarm(true)?;
            println!("test alarm requested in {}", settings.path().display());
            Ok(())
        }
        None => run(&config_path),
    }
}

fn init(config_path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    if force || !config_path.exists() {
        Config::new().save(config_path)?;
        println!("wrote {}", config_path.display());
    }
    let config = Config::load(config_path)?;
    let settings = SettingsStore::new(config.alarm_path(config_path));
    if force || !settings.path().exists() {
        settings.save(&AlarmConfig::default())?;
        println!("wrote {}", settings.path().display());
    }
    fs::create_dir_all(&config.download_dir)?;
    fs::create_dir_all(&config.music_dir)?;
    println!("put offline wake-up music into {}", config.music_dir.display());
    Ok(())
}

fn run(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let config = Config::load_or_default(config_path)?;
    info!("using config {}", config_path.display());

    // has to outlive the sink
    let stream = rodio::OutputStreamBuilder::open_default_stream()?;
    let sink = Sink::connect_new(stream.mixer());
    let sound: Arc<dyn Sound> = Arc::new(Speaker::new(sink, &config));

    let fetcher = Arc::new(HttpFetcher::new(config.connectivity_timeout())?);
    let resolver = ContentResolver::new(
        fetcher,
        config.download_dir.clone(),
        config.purge_dirs(),
        config.default_podcast_url.clone(),
        config.default_stream_url.clone(),
    );
    let scheduler = Arc::new(AnnouncementScheduler::new(
        sound,
        Arc::new(resolver),
        config.connectivity_probe_url.clone(),
        config.network_reset_command.clone(),
    ));

    let gpio = config.gpio;
    let amplifier = SysfsPin::export(gpio.base + gpio.amplifier)?.into_output(false)?;
    let photocell = SysfsPin::export(gpio.base + gpio.photocell)?;
    let button = SysfsPin::export(gpio.base + gpio.button)?.into_input()?;
    let hardware = Hardware {
        display: ConsoleDisplay::new(std::io::stdout()),
        light: ChargeTimeSensor::new(photocell),
        amplifier,
    };

    let settings = SettingsStore::new(config.alarm_path(config_path));
    let mut clock = AlarmClock::new(&config, settings, Arc::new(LocalTime), scheduler, hardware);
    if let Err(e) = clock.attach_button(button).and_then(|()| clock.run()) {
        clock.emergency_stop(&e);
        return Err(e.into());
    }
    info!("shut down");
    Ok(())
}

use anyhow::{Context, Result, bail};
use cadence::audio::EngineHandle;
use cadence::config;
use cadence::controller::{ControllerOptions, PlaybackController};
use cadence::equalizer::EqualizerController;
use cadence::error::DataError;
use cadence::library::{self, LibraryWatcher, MetadataEdit};
use cadence::lyrics::{self, Lyrics};
use cadence::lyrics_service::LyricsService;
use cadence::model::{PlaybackQueue, SavedPlayerState, Settings, Track};
use cadence::notify::{self, Notice, NoticeKind, Notifier};
use cadence::playback::{PlaybackEvent, PlaybackState};
use cadence::remote::lrclib::{self, LrclibProvider};
use cadence::remote::{LyricsProvider, MetadataProvider, MetadataSearchResult, MusicBrainzProvider};
use cadence::repository::{
    JsonLyricsStore, JsonPlaylistStore, LyricsRepository, PlaylistRepository,
};
use cadence::sleep_timer::SleepTimer;
use cadence::store::StateStore;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

#[derive(Debug, PartialEq)]
enum Command {
    Scan,
    FolderAdd(PathBuf),
    FolderList,
    LyricsParse(PathBuf),
    LyricsFetch(PathBuf),
    LyricsEdit { audio: PathBuf, file: PathBuf },
    LyricsPublish(PathBuf),
    MetadataSearch { query: String, duration_ms: u64 },
    MetadataApply { file: PathBuf, pick: usize },
    Tag { file: PathBuf, fields: Vec<(String, String)> },
    Cover { file: PathBuf, image: PathBuf },
    Challenge { prefix: String, target: String },
    PlaylistImport { name: String, file: PathBuf },
    PlaylistList,
    PlaylistRename { from: String, to: String },
    PlaylistDelete(String),
    Equalizer(Vec<String>),
    Play(Option<String>),
}

#[derive(Debug)]
struct CliArgs {
    config_dir: Option<PathBuf>,
    command: Command,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1).collect())?;
    if let Some(dir) = &args.config_dir {
        // SAFETY: no other threads have been started yet.
        unsafe { std::env::set_var(config::CONFIG_DIR_ENV, dir) };
    }

    match args.command {
        Command::Scan => run_scan(),
        Command::FolderAdd(dir) => run_folder_add(dir),
        Command::FolderList => run_folder_list(),
        Command::LyricsParse(file) => run_lyrics_parse(file),
        Command::LyricsFetch(file) => run_lyrics_fetch(file),
        Command::LyricsEdit { audio, file } => run_lyrics_edit(&audio, &file),
        Command::LyricsPublish(audio) => run_lyrics_publish(&audio),
        Command::MetadataSearch { query, duration_ms } => run_metadata_search(&query, duration_ms),
        Command::MetadataApply { file, pick } => run_metadata_apply(&file, pick),
        Command::Tag { file, fields } => run_tag(&file, &fields),
        Command::Cover { file, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            report_data_error(library::write_cover_art(&file, &bytes))
        }
        Command::Challenge { prefix, target } => {
            let nonce = lrclib::solve_challenge(&prefix, &target)
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            println!("{prefix}:{nonce}");
            Ok(())
        }
        Command::PlaylistImport { name, file } => run_playlist_import(&name, file),
        Command::PlaylistList => run_playlist_list(),
        Command::PlaylistRename { from, to } => JsonPlaylistStore::open_default()?.rename(&from, &to),
        Command::PlaylistDelete(name) => JsonPlaylistStore::open_default()?.delete(&name),
        Command::Equalizer(args) => run_equalizer(&args),
        Command::Play(query) => run_play(query),
    }
}

fn parse_args(args: Vec<String>) -> Result<CliArgs> {
    let mut config_dir = None;
    let mut rest = Vec::new();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--config-dir" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    bail!("--config-dir requires a directory");
                };
                config_dir = Some(PathBuf::from(value));
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => rest.push(other.to_string()),
        }
        index += 1;
    }

    let command = parse_command(&rest)?;
    Ok(CliArgs {
        config_dir,
        command,
    })
}

fn parse_command(words: &[String]) -> Result<Command> {
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        ["scan"] => Command::Scan,
        ["folder", "add", dir] => Command::FolderAdd(PathBuf::from(dir)),
        ["folder", "list"] => Command::FolderList,
        ["lyrics", "parse", file] => Command::LyricsParse(PathBuf::from(file)),
        ["lyrics", "fetch", file] => Command::LyricsFetch(PathBuf::from(file)),
        ["lyrics", "edit", audio, file] => Command::LyricsEdit {
            audio: PathBuf::from(audio),
            file: PathBuf::from(file),
        },
        ["lyrics", "publish", audio] => Command::LyricsPublish(PathBuf::from(audio)),
        ["metadata", "apply", file] => Command::MetadataApply {
            file: PathBuf::from(file),
            pick: 0,
        },
        ["metadata", "apply", file, pick] => Command::MetadataApply {
            file: PathBuf::from(file),
            pick: pick
                .parse()
                .with_context(|| format!("invalid result number {pick}"))?,
        },
        ["metadata", "search", query @ ..] if !query.is_empty() => {
            let mut duration_ms = 0;
            let mut terms = Vec::new();
            let mut iter = query.iter();
            while let Some(word) = iter.next() {
                if *word == "--duration" {
                    let Some(value) = iter.next() else {
                        bail!("--duration requires milliseconds");
                    };
                    duration_ms = value
                        .parse()
                        .with_context(|| format!("invalid duration {value}"))?;
                } else {
                    terms.push(*word);
                }
            }
            Command::MetadataSearch {
                query: terms.join(" "),
                duration_ms,
            }
        }
        ["challenge", prefix, target] => Command::Challenge {
            prefix: prefix.to_string(),
            target: target.to_string(),
        },
        ["playlist", "import", name, file] => Command::PlaylistImport {
            name: name.to_string(),
            file: PathBuf::from(file),
        },
        ["playlist", "list"] => Command::PlaylistList,
        ["playlist", "rename", from, to] => Command::PlaylistRename {
            from: from.to_string(),
            to: to.to_string(),
        },
        ["playlist", "delete", name] => Command::PlaylistDelete(name.to_string()),
        ["tag", file, fields @ ..] if !fields.is_empty() => Command::Tag {
            file: PathBuf::from(file),
            fields: fields
                .iter()
                .map(|field| {
                    field
                        .split_once('=')
                        .map(|(key, value)| (key.to_string(), value.to_string()))
                        .with_context(|| format!("expected FIELD=VALUE, got {field}"))
                })
                .collect::<Result<_>>()?,
        },
        ["cover", file, image] => Command::Cover {
            file: PathBuf::from(file),
            image: PathBuf::from(image),
        },
        ["eq", rest @ ..] => Command::Equalizer(rest.iter().map(|w| w.to_string()).collect()),
        ["play"] => Command::Play(None),
        ["play", query @ ..] => Command::Play(Some(query.join(" "))),
        [] => bail!("missing command, see --help"),
        other => bail!("unknown command {}", other.join(" ")),
    };
    Ok(command)
}

fn print_help() {
    println!("cadence [--config-dir DIR] <command>");
    println!("  scan                              List tracks in configured folders");
    println!("  folder add DIR | folder list      Manage scanned folders");
    println!("  lyrics parse FILE                 Parse and re-emit synced lyrics");
    println!("  lyrics fetch AUDIO_FILE           Fetch lyrics from LRCLIB and store them");
    println!("  lyrics edit AUDIO_FILE LRC_FILE   Replace stored lyrics with a local file");
    println!("  lyrics publish AUDIO_FILE         Publish stored synced lyrics to LRCLIB");
    println!("  metadata search QUERY [--duration MS]");
    println!("  metadata apply AUDIO_FILE [N]     Write the Nth MusicBrainz match into the tags");
    println!("  tag AUDIO_FILE FIELD=VALUE...     Edit title, artist, album, album_artist,");
    println!("                                    genre, year, track or lyrics");
    println!("  cover AUDIO_FILE IMAGE            Embed front cover art");
    println!("  challenge PREFIX TARGET_HEX       Solve an LRCLIB publish challenge");
    println!("  playlist import NAME FILE.m3u | playlist list");
    println!("  playlist rename OLD NEW | playlist delete NAME");
    println!("  eq [on|off|set BAND MB|reset]     Show or change stored equalizer settings");
    println!("                                    (stored only; playback output is not equalized)");
    println!("  play [QUERY]                      Interactive playback session");
}

fn run_scan() -> Result<()> {
    let settings = config::load_settings()?;
    let mut tracks = library::get_tracks(&settings);
    library::sort_tracks(&mut tracks, settings.track_sort, settings.track_sort_order);
    for track in &tracks {
        println!("{}", describe_track(track));
    }
    log::info!("{} tracks", tracks.len());
    Ok(())
}

fn run_folder_add(dir: PathBuf) -> Result<()> {
    let dir = config::normalize_path(&dir);
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let mut settings = config::load_settings()?;
    if !settings.folders.contains(&dir) {
        settings.folders.push(dir);
        config::save_settings(&settings)?;
    }
    run_folder_list()
}

fn run_folder_list() -> Result<()> {
    let settings = config::load_settings()?;
    for folder in &settings.folders {
        println!("{}", folder.display());
    }
    let found = library::folders_with_audio(&library::get_tracks(&settings));
    log::info!("{} folders contain audio", found.len());
    Ok(())
}

fn run_lyrics_parse(file: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let lines = lyrics::parse_block(&raw)?;
    print!("{}", lyrics::format_block(&lines));
    Ok(())
}

fn run_lyrics_fetch(file: PathBuf) -> Result<()> {
    let track = library::read_track(&config::normalize_path(&file));
    let provider = LrclibProvider::new()?;
    let lyrics = provider
        .get_lyrics(&track)
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    JsonLyricsStore::open_default()?.insert(lyrics.clone())?;
    print_lyrics(&lyrics, None);
    Ok(())
}

fn open_lyrics_service(notifier: Notifier) -> Result<LyricsService> {
    let store: Arc<dyn LyricsRepository> = Arc::new(JsonLyricsStore::open_default()?);
    let provider: Option<Arc<dyn LyricsProvider>> = match LrclibProvider::new() {
        Ok(provider) => Some(Arc::new(provider)),
        Err(err) => {
            log::warn!("online lyrics disabled: {err:#}");
            None
        }
    };
    Ok(LyricsService::new(store, provider, notifier))
}

fn run_lyrics_edit(audio: &Path, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let track = library::read_track(&config::normalize_path(audio));
    let (notifier, _notices) = Notifier::channel();
    let lyrics = open_lyrics_service(notifier)?.save_edit(&track, &raw)?;
    print_lyrics(&lyrics, None);
    Ok(())
}

fn run_lyrics_publish(audio: &Path) -> Result<()> {
    let track = library::read_track(&config::normalize_path(audio));
    let (notifier, notices) = Notifier::channel();
    let service = open_lyrics_service(notifier)?;
    let Some(lyrics) = service.load(&track) else {
        print_notices(&notices);
        bail!("no lyrics stored for {}", track.path.display());
    };
    if !lyrics.is_synced() {
        bail!("only synced lyrics can be published");
    }
    let result = service.publish(&track, &lyrics);
    print_notices(&notices);
    result.map_err(|err| anyhow::anyhow!("{err}"))
}

fn run_metadata_apply(file: &Path, pick: usize) -> Result<()> {
    let track = library::read_track(&config::normalize_path(file));
    let query = match &track.artist {
        Some(artist) => format!("{artist} {}", track.title),
        None => track.title.clone(),
    };
    let provider = MusicBrainzProvider::new()?;
    let results = provider
        .search_metadata(&query, track.duration_ms)
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    let Some(result) = results.get(pick) else {
        bail!("{} results for {query}, nothing at {pick}", results.len());
    };

    let mut edit = MetadataEdit::from_track(&track);
    apply_search_result(&mut edit, result);
    report_data_error(library::write_metadata(&track.path, &edit))?;
    println!("tagged {}", describe_track(&library::read_track(&track.path)));

    match provider.cover_art_bytes(result) {
        Ok(bytes) => report_data_error(library::write_cover_art(&track.path, &bytes))?,
        Err(err) => log::warn!("no cover art for {}: {err}", result.album),
    }
    Ok(())
}

fn apply_search_result(edit: &mut MetadataEdit, result: &MetadataSearchResult) {
    edit.title = Some(result.title.clone());
    edit.artist = Some(result.artist.clone());
    edit.album = Some(result.album.clone());
    edit.album_artist = Some(result.album_artist.clone());
    if let Some(genre) = result.genres.as_ref().and_then(|genres| genres.first()) {
        edit.genre = Some(genre.clone());
    }
    if result.year.is_some() {
        edit.year = result.year.clone();
    }
    if result.track_number.is_some() {
        edit.track_number = result.track_number.clone();
    }
}

fn run_tag(file: &Path, fields: &[(String, String)]) -> Result<()> {
    let track = library::read_track(&config::normalize_path(file));
    let mut edit = MetadataEdit::from_track(&track);
    for (key, value) in fields {
        let value = (!value.is_empty()).then(|| value.clone());
        match key.as_str() {
            "title" => edit.title = value,
            "artist" => edit.artist = value,
            "album" => edit.album = value,
            "album_artist" => edit.album_artist = value,
            "genre" => edit.genre = value,
            "year" => edit.year = value,
            "track" => edit.track_number = value,
            "lyrics" => edit.lyrics = value,
            other => bail!("unknown tag field {other}"),
        }
    }
    report_data_error(library::write_metadata(&track.path, &edit))
}

/// Shows the user message of a classified failure before it propagates.
fn report_data_error(result: Result<()>) -> Result<()> {
    if let Err(err) = &result
        && let Some(data_error) = err.downcast_ref::<DataError>()
    {
        let (notifier, notices) = Notifier::channel();
        notifier.data_error(*data_error);
        print_notices(&notices);
    }
    result
}

fn run_metadata_search(query: &str, duration_ms: u64) -> Result<()> {
    let provider = MusicBrainzProvider::new()?;
    let results = provider
        .search_metadata(query, duration_ms)
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    for result in &results {
        println!(
            "{} - {} [{}] #{} {}",
            result.artist,
            result.title,
            result.album,
            result.track_number.as_deref().unwrap_or("?"),
            result.year.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn run_playlist_import(name: &str, file: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let settings = config::load_settings()?;
    let playlist = library::parse_m3u(name, &content, &library::get_tracks(&settings));
    println!(
        "imported {} tracks into {}",
        playlist.len(),
        playlist.name.as_deref().unwrap_or_default()
    );
    JsonPlaylistStore::open_default()?.insert(playlist)
}

fn run_playlist_list() -> Result<()> {
    for playlist in JsonPlaylistStore::open_default()?.all() {
        println!(
            "{} ({} tracks)",
            playlist.name.as_deref().unwrap_or_default(),
            playlist.len()
        );
    }
    Ok(())
}

fn run_equalizer(args: &[String]) -> Result<()> {
    let mut eq = EqualizerController::load()?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        [] => {}
        ["on"] => eq.set_enabled(true)?,
        ["off"] => eq.set_enabled(false)?,
        ["reset"] => eq.reset()?,
        ["set", band, level] => {
            let band: usize = band.parse().context("band must be a number")?;
            let level: i16 = level.parse().context("level must be millibels")?;
            eq.set_band_level(band, level)?;
        }
        other => bail!("unknown eq arguments {}", other.join(" ")),
    }

    let settings = eq.settings();
    println!("enabled: {} (stored, not applied to playback)", settings.enabled);
    for (band, (freq, level)) in settings
        .band_frequencies
        .iter()
        .zip(&settings.band_levels_mb)
        .enumerate()
    {
        println!("{band}: {freq:>14} {level:+} mB");
    }
    Ok(())
}

fn run_play(query: Option<String>) -> Result<()> {
    let settings = config::load_settings()?;
    let (notifier, notices) = Notifier::channel();

    let tracks = StateStore::new(library::get_tracks(&settings));
    let _watcher = LibraryWatcher::spawn(settings.clone(), tracks.clone());

    let lyrics_service = Arc::new(open_lyrics_service(notifier.clone())?);

    let saved = config::load_player_state()?;
    let (engine, engine_events) = EngineHandle::spawn_default();
    let controller = PlaybackController::new(
        engine,
        engine_events,
        notifier.clone(),
        session_options(&settings, &saved, config::player_state_path()?),
    );

    match query {
        Some(query) => select_matching(&controller, &tracks.snapshot(), &query),
        None => controller.restore(&saved),
    }
    let sleep_timer = SleepTimer::new();

    print_state(&controller.state());
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print_notices(&notices);
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        let event = match words.as_slice() {
            [] => None,
            ["quit" | "exit" | "q"] => break,
            ["next" | "n"] => Some(PlaybackEvent::SeekToNext),
            ["prev" | "p"] => Some(PlaybackEvent::SeekToPrevious),
            ["toggle" | "t"] => Some(PlaybackEvent::TogglePlayPause),
            ["mode"] => Some(PlaybackEvent::CyclePlaybackMode),
            ["reset"] => Some(PlaybackEvent::ResetPlayback),
            ["seek", ms] => ms.parse().ok().map(PlaybackEvent::SeekTo),
            ["rm", index] => index.parse().ok().map(PlaybackEvent::RemoveFromQueue),
            ["mv", from, to] => match (from.parse(), to.parse()) {
                (Ok(from), Ok(to)) => Some(PlaybackEvent::ReorderQueue { from, to }),
                _ => None,
            },
            ["add", query @ ..] => {
                let library = tracks.snapshot();
                let matches: Vec<Track> = library::filter_tracks(&library, &query.join(" "))
                    .into_iter()
                    .cloned()
                    .collect();
                Some(PlaybackEvent::AddToQueue(matches))
            }
            ["playnext", query @ ..] => {
                let library = tracks.snapshot();
                library::filter_tracks(&library, &query.join(" "))
                    .first()
                    .map(|track| PlaybackEvent::PlayNext((*track).clone()))
            }
            ["find", query @ ..] => {
                select_matching(&controller, &tracks.snapshot(), &query.join(" "));
                None
            }
            ["queue"] => {
                print_queue(&controller.state());
                continue;
            }
            ["lyrics"] => {
                let state = controller.state();
                match &state.lyrics {
                    Some(lyrics) => print_lyrics(lyrics, Some(state.position_ms)),
                    None if state.is_loading_lyrics => println!("loading lyrics..."),
                    None => {
                        controller.load_lyrics(Arc::clone(&lyrics_service));
                        println!("looking for lyrics, try again in a moment");
                    }
                }
                continue;
            }
            ["sleep", minutes] => {
                match sleep_duration(minutes) {
                    Ok(None) => {
                        sleep_timer.cancel();
                    }
                    Ok(Some(duration)) => {
                        let controller = controller.clone();
                        if let Err(err) = sleep_timer.start(duration, move || {
                            controller.dispatch(PlaybackEvent::Pause);
                        }) {
                            println!("{err}");
                        }
                    }
                    Err(err) => println!("{err}; usage: sleep MIN (0 cancels)"),
                }
                None
            }
            _ => {
                println!("commands: next prev toggle mode seek MS rm I mv FROM TO add Q playnext Q find Q queue lyrics sleep MIN reset quit");
                continue;
            }
        };

        if let Some(event) = event {
            controller.dispatch(event);
        }
        print_state(&controller.state());
    }

    controller.dispatch(PlaybackEvent::Pause);
    Ok(())
}

/// Sessions keep the playback mode saved by the previous run, whether or not a query starts them.
fn session_options(
    settings: &Settings,
    saved: &SavedPlayerState,
    state_path: PathBuf,
) -> ControllerOptions {
    ControllerOptions {
        mode: saved.playback_mode,
        jump_to_beginning: settings.jump_to_beginning,
        state_path: Some(state_path),
    }
}

/// `Ok(None)` cancels the timer.
fn sleep_duration(minutes: &str) -> Result<Option<Duration>> {
    let minutes: u64 = minutes
        .parse()
        .with_context(|| format!("invalid minutes {minutes}"))?;
    if minutes == 0 {
        return Ok(None);
    }
    let seconds = minutes
        .checked_mul(60)
        .with_context(|| format!("{minutes} minutes is too long"))?;
    Ok(Some(Duration::from_secs(seconds)))
}

fn select_matching(controller: &PlaybackController, library: &[Track], query: &str) {
    let matches: Vec<Track> = library::filter_tracks(library, query)
        .into_iter()
        .cloned()
        .collect();
    let Some(first) = matches.first().cloned() else {
        println!("no tracks match {query}");
        return;
    };
    controller.dispatch(PlaybackEvent::SelectTrack {
        track: first,
        queue: PlaybackQueue::unnamed(matches),
    });
}

fn describe_track(track: &Track) -> String {
    format!(
        "{} - {} ({}) {}",
        track.display_artist(),
        track.title,
        track.album.as_deref().unwrap_or("no album"),
        track.path.display()
    )
}

fn format_ms(ms: u64) -> String {
    format!("{}:{:02}", ms / 60_000, (ms / 1000) % 60)
}

fn print_state(state: &PlaybackState) {
    match state.current_track() {
        Some(track) => println!(
            "{} {} - {} [{} / {}] {} ({} queued)",
            if state.is_playing { ">" } else { "||" },
            track.display_artist(),
            track.title,
            format_ms(state.position_ms),
            format_ms(track.duration_ms),
            state.mode.label(),
            state.queue_len()
        ),
        None => println!("nothing playing ({})", state.mode.label()),
    }
}

fn print_queue(state: &PlaybackState) {
    let Some(queue) = &state.queue else {
        println!("queue is empty");
        return;
    };
    for (index, track) in queue.tracks.iter().enumerate() {
        let marker = if state.current_index == Some(index) { "*" } else { " " };
        println!("{marker}{index:>3} {}", describe_track(track));
    }
}

fn print_lyrics(lyrics: &Lyrics, position_ms: Option<u64>) {
    match &lyrics.synced {
        Some(lines) if !lines.is_empty() => {
            let active = position_ms.and_then(|pos| lyrics::active_line_index(lines, pos));
            for (index, line) in lines.iter().enumerate() {
                let marker = if active == Some(index) { ">" } else { " " };
                println!("{marker} {}", lyrics::format_line(line));
            }
        }
        _ => println!("{}", lyrics.plain_text().unwrap_or_default()),
    }
}

fn print_notices(notices: &Receiver<Notice>) {
    for notice in notify::drain(notices) {
        match notice.kind {
            NoticeKind::Info => println!("* {}", notice.message),
            NoticeKind::Error => println!("! {}", notice.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence::error::LocalError;
    use cadence::model::PlaybackMode;

    fn words(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn classified_failures_still_propagate_after_reporting() {
        let failure = DataError::Local(LocalError::NoWritePermission);
        let err = report_data_error(Err(anyhow::Error::new(failure))).expect_err("still fails");
        assert_eq!(err.downcast_ref::<DataError>(), Some(&failure));
        assert!(report_data_error(Ok(())).is_ok());
    }

    #[test]
    fn parses_config_dir_anywhere() {
        let args = parse_args(words("folder list --config-dir /tmp/c")).expect("args");
        assert_eq!(args.config_dir, Some(PathBuf::from("/tmp/c")));
        assert_eq!(args.command, Command::FolderList);
    }

    #[test]
    fn metadata_search_takes_duration_flag() {
        let command = parse_command(&words("metadata search daft punk --duration 240000"))
            .expect("command");
        assert_eq!(
            command,
            Command::MetadataSearch {
                query: String::from("daft punk"),
                duration_ms: 240_000
            }
        );
    }

    #[test]
    fn play_query_is_optional() {
        assert_eq!(parse_command(&words("play")).expect("play"), Command::Play(None));
        assert_eq!(
            parse_command(&words("play some band")).expect("play"),
            Command::Play(Some(String::from("some band")))
        );
    }

    #[test]
    fn tag_fields_split_on_first_equals() {
        let command = parse_command(&words("tag song.mp3 title=a=b year=")).expect("tag");
        assert_eq!(
            command,
            Command::Tag {
                file: PathBuf::from("song.mp3"),
                fields: vec![
                    (String::from("title"), String::from("a=b")),
                    (String::from("year"), String::new()),
                ],
            }
        );
        assert!(parse_command(&words("tag song.mp3 title")).is_err());
    }

    #[test]
    fn metadata_apply_defaults_to_first_result() {
        assert_eq!(
            parse_command(&words("metadata apply song.mp3")).expect("apply"),
            Command::MetadataApply {
                file: PathBuf::from("song.mp3"),
                pick: 0
            }
        );
        assert!(parse_command(&words("metadata apply song.mp3 x")).is_err());
    }

    #[test]
    fn search_result_keeps_known_fields_when_missing() {
        let mut edit = MetadataEdit {
            year: Some(String::from("1999")),
            genre: Some(String::from("house")),
            lyrics: Some(String::from("la la")),
            ..MetadataEdit::default()
        };
        let result = MetadataSearchResult {
            id: String::from("rec"),
            title: String::from("Song"),
            artist: String::from("Band"),
            album_id: String::from("rel"),
            album: String::from("Record"),
            album_artist: String::from("Band"),
            track_number: Some(String::from("3")),
            description: None,
            album_description: None,
            year: None,
            genres: None,
        };
        apply_search_result(&mut edit, &result);
        assert_eq!(edit.title.as_deref(), Some("Song"));
        assert_eq!(edit.track_number.as_deref(), Some("3"));
        assert_eq!(edit.year.as_deref(), Some("1999"));
        assert_eq!(edit.genre.as_deref(), Some("house"));
        assert_eq!(edit.lyrics.as_deref(), Some("la la"));
    }

    #[test]
    fn session_keeps_saved_playback_mode() {
        let saved = SavedPlayerState {
            playback_mode: PlaybackMode::Shuffle,
            ..SavedPlayerState::default()
        };
        let settings = Settings {
            jump_to_beginning: false,
            ..Settings::default()
        };
        let options = session_options(&settings, &saved, PathBuf::from("/tmp/state.json"));
        assert_eq!(options.mode, PlaybackMode::Shuffle);
        assert!(!options.jump_to_beginning);
        assert_eq!(options.state_path, Some(PathBuf::from("/tmp/state.json")));
    }

    #[test]
    fn sleep_minutes_are_checked() {
        assert_eq!(sleep_duration("0").expect("cancel"), None);
        assert_eq!(
            sleep_duration("15").expect("minutes"),
            Some(Duration::from_secs(900))
        );
        assert!(sleep_duration("abc").is_err());
        assert!(sleep_duration("307445734561825861").is_err());
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(parse_command(&words("dance")).is_err());
        assert!(parse_command(&[]).is_err());
        assert!(parse_args(words("--config-dir")).is_err());
    }
}

//! Headless listener: joins a room and keeps a simulated player in sync.
//!
//! Commands are read from stdin, one per line.

use std::{io::BufRead, sync::Arc, time::Duration};

use clap::Parser;

use listenroom::{
    client::{
        ClientCommand, ClientOptions, LocalRoom, RoomClient, SimulatedPlayer,
        constants::DRIFT_POLL_INTERVAL_MS,
    },
    common::{
        clock::{Clock, SystemClock},
        logger,
        types::{AnyResult, RoomId},
    },
    protocol::{ControlPayload, PlaybackAction, TrackRequest},
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Listen along in a listenroom room", long_about = None)]
struct Args {
    /// WebSocket endpoint of the server
    #[arg(long, env = "LISTENROOM_URL", default_value = "ws://127.0.0.1:3030/v1/websocket")]
    url: String,

    /// Room code to join (created if it does not exist)
    #[arg(long, env = "LISTENROOM_ROOM", default_value = "lobby")]
    room: String,

    /// Display name
    #[arg(long, env = "LISTENROOM_NAME", default_value = "listener")]
    name: String,

    /// Name for the room when this join creates it
    #[arg(long)]
    room_name: Option<String>,

    /// Server password, sent as the Authorization header
    #[arg(long, env = "LISTENROOM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Play without a server
    #[arg(long)]
    local: bool,
}

const HELP: &str = "commands: /play [secs] | /pause | /seek <secs> | /next | /prev | /volume <0-1> | \
/add <url> [duration] [title...] | /sync | /leave | anything else is chat";

fn parse_command(line: &str) -> Result<ClientCommand, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ClientCommand::Chat(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let number = |arg: Option<&str>| -> Result<Option<f64>, String> {
        arg.map(|s| s.parse::<f64>().map_err(|_| format!("not a number: {}", s)))
            .transpose()
    };
    let control = |action, current_time, volume| ClientCommand::Control {
        action,
        payload: ControlPayload {
            current_time,
            volume,
        },
    };

    match verb {
        "play" => Ok(control(PlaybackAction::Play, number(parts.next())?, None)),
        "pause" => Ok(control(PlaybackAction::Pause, None, None)),
        "seek" => match number(parts.next())? {
            Some(secs) => Ok(control(PlaybackAction::Seek, Some(secs), None)),
            None => Err("usage: /seek <secs>".into()),
        },
        "next" => Ok(control(PlaybackAction::Next, None, None)),
        "prev" => Ok(control(PlaybackAction::Previous, None, None)),
        "volume" => match number(parts.next())? {
            Some(v) => Ok(control(PlaybackAction::Volume, None, Some(v as f32))),
            None => Err("usage: /volume <0-1>".into()),
        },
        "add" => {
            let Some(source) = parts.next() else {
                return Err("usage: /add <url> [duration] [title...]".into());
            };
            let duration = parts
                .next()
                .map(|d| d.parse::<u32>().map_err(|_| format!("not a duration: {}", d)))
                .transpose()?
                .unwrap_or(0);
            let title: Vec<&str> = parts.collect();
            let title = if title.is_empty() {
                source.rsplit('/').next().unwrap_or(source).to_string()
            } else {
                title.join(" ")
            };
            Ok(ClientCommand::AddSong(TrackRequest {
                title,
                artist: String::new(),
                duration,
                source: source.to_string(),
            }))
        }
        "sync" => Ok(ClientCommand::RequestSync),
        "leave" | "quit" => Ok(ClientCommand::Leave),
        _ => Err(HELP.into()),
    }
}

/// Reads stdin on a plain thread; the async side only sees parsed commands.
fn spawn_stdin_reader(tx: flume::Sender<ClientCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(command) => {
                    let leaving = matches!(command, ClientCommand::Leave);
                    if tx.send(command).is_err() || leaving {
                        break;
                    }
                }
                Err(usage) => eprintln!("{}", usage),
            }
        }
    });
}

async fn run_local(name: String, commands: flume::Receiver<ClientCommand>) -> AnyResult<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let player = SimulatedPlayer::new(clock.clone());
    let mut local = LocalRoom::new(&name, player, clock)?;
    info!("Playing locally as {}", name);

    let mut tick = tokio::time::interval(Duration::from_millis(DRIFT_POLL_INTERVAL_MS));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                local.tick();
            }
            command = commands.recv_async() => {
                let Ok(command) = command else { break };
                if !local.handle(command) {
                    break;
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    logger::init_plain("info");

    let args = Args::parse();

    let (tx, rx) = flume::unbounded();
    spawn_stdin_reader(tx);
    info!("{}", HELP);

    if args.local {
        return run_local(args.name, rx).await;
    }

    let options = ClientOptions {
        url: args.url,
        room_id: RoomId::from(args.room),
        name: args.name,
        room_name: args.room_name,
        password: args.password,
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let player = SimulatedPlayer::new(clock.clone());

    if let Err(e) = RoomClient::new(options, player, rx, clock).run().await {
        warn!("Client stopped: {}", e);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_controls_and_chat() {
        match parse_command("/seek 42.5").unwrap() {
            ClientCommand::Control { action, payload } => {
                assert_eq!(action, PlaybackAction::Seek);
                assert_eq!(payload.current_time, Some(42.5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(matches!(
            parse_command("  hello there ").unwrap(),
            ClientCommand::Chat(text) if text == "hello there"
        ));
        assert!(parse_command("/seek").is_err());
        assert!(parse_command("/rewind").is_err());
    }

    #[test]
    fn add_defaults_title_to_file_name() {
        match parse_command("/add https://media.example/a/song.mp3 180").unwrap() {
            ClientCommand::AddSong(track) => {
                assert_eq!(track.title, "song.mp3");
                assert_eq!(track.duration, 180);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "listenroom-client",
            "--url",
            "ws://music.example:3030/v1/websocket",
            "--room",
            "ABC123",
            "--name",
            "bo",
            "--room-name",
            "Friday",
            "--local",
        ])
        .unwrap();
        assert_eq!(args.url, "ws://music.example:3030/v1/websocket");
        assert_eq!(args.room, "ABC123");
        assert_eq!(args.name, "bo");
        assert_eq!(args.room_name.as_deref(), Some("Friday"));
        assert!(args.local);

        assert!(Args::try_parse_from(["listenroom-client", "--volume", "1"]).is_err());
    }
}

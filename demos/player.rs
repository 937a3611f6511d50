// ABOUTME: End-to-end player example
// ABOUTME: Connects to server, receives audio, and plays it back through the player core

use clap::Parser;
use sendspin::protocol::client::ProtocolClient;
use sendspin::protocol::messages::{
    AudioFormatSpec, ClientHello, ClientState, ClientTime, DeviceInfo, Message, PlayerState,
    PlayerSyncState, PlayerV1Support,
};
use sendspin::sync::conversions;
use sendspin::Player;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::interval;

/// Sendspin audio player
#[derive(Parser, Debug)]
#[command(name = "player")]
#[command(about = "Connect to Sendspin server and play audio", long_about = None)]
struct Args {
    /// WebSocket URL of the Sendspin server
    #[arg(short, long, default_value = "ws://localhost:8927/sendspin")]
    server: String,

    /// Client name
    #[arg(short, long, default_value = "Sendspin-RS Player")]
    name: String,

    /// Output device name; defaults to the host's default output device
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let hello = ClientHello {
        client_id: uuid::Uuid::new_v4().to_string(),
        name: args.name.clone(),
        version: 1,
        supported_roles: vec!["player@v1".to_string()],
        device_info: Some(DeviceInfo {
            product_name: Some(args.name.clone()),
            manufacturer: Some("Sendspin".to_string()),
            software_version: Some("0.1.0".to_string()),
        }),
        player_v1_support: Some(PlayerV1Support {
            supported_formats: vec![AudioFormatSpec {
                codec: "pcm".to_string(),
                channels: 2,
                sample_rate: 48000,
                bit_depth: 16,
            }],
            buffer_capacity: 100,
            supported_commands: vec!["play".to_string(), "pause".to_string()],
        }),
        artwork_v1_support: None,
        visualizer_v1_support: None,
    };

    println!("Connecting to {}...", args.server);
    let client = ProtocolClient::connect(&args.server, hello).await?;
    println!("Connected!");

    let (mut message_rx, mut audio_rx, clock_sync, ws_tx) = client.split();

    let client_state = Message::ClientState(ClientState {
        player: Some(PlayerState {
            state: PlayerSyncState::Synchronized,
            volume: Some(100),
            muted: Some(false),
        }),
    });
    ws_tx.send_message(client_state).await?;
    println!("Sent initial client/state");

    let client_transmitted = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as i64;
    let time_msg = Message::ClientTime(ClientTime { client_transmitted });
    ws_tx.send_message(time_msg).await?;
    println!("Sent initial client/time for clock sync");

    println!("Waiting for stream to start...");

    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let client_transmitted = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_micros() as i64;
            let time_msg = Message::ClientTime(ClientTime { client_transmitted });
            if let Err(e) = ws_tx.send_message(time_msg).await {
                eprintln!("Failed to send time sync: {}", e);
                break;
            }
        }
    });

    let (server_to_client, client_to_server) = conversions(clock_sync);
    let mut player = Player::new(server_to_client, client_to_server, args.device.clone());
    let mut format_set = false;

    loop {
        tokio::select! {
            Some(msg) = message_rx.recv() => {
                match msg {
                    Message::StreamStart(stream_start) => {
                        if let Some(ref player_config) = stream_start.player {
                            println!(
                                "Stream starting: codec='{}' {}Hz {}ch {}bit",
                                player_config.codec,
                                player_config.sample_rate,
                                player_config.channels,
                                player_config.bit_depth
                            );

                            if player_config.codec != "pcm" {
                                eprintln!("ERROR: Unsupported codec '{}' - only 'pcm' is supported!", player_config.codec);
                                continue;
                            }
                            if player_config.bit_depth != 16 {
                                eprintln!("ERROR: Unsupported bit depth {} - only 16-bit PCM supported!", player_config.bit_depth);
                                continue;
                            }

                            match player.set_format(player_config.sample_rate, player_config.channels) {
                                Ok(()) => {
                                    format_set = true;
                                    println!("Output stream opened");
                                }
                                Err(e) => {
                                    eprintln!("Failed to open output stream: {}", e);
                                    format_set = false;
                                }
                            }
                        }
                    }
                    Message::StreamEnd(_) | Message::StreamClear(_) => {
                        player.clear();
                    }
                    Message::ServerCommand(cmd) => {
                        if let Some(p) = cmd.player {
                            if p.command == "volume" {
                                if let Some(volume) = p.volume {
                                    player.set_volume(volume, p.mute.unwrap_or(false));
                                }
                            } else if p.command == "mute" {
                                if let Some(mute) = p.mute {
                                    player.set_volume(100, mute);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Some(chunk) = audio_rx.recv() => {
                if format_set {
                    player.submit(chunk.timestamp, &chunk.data);
                }
            }
            else => {
                break;
            }
        }
    }

    player.stop();
    Ok(())
}

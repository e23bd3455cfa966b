use std::io as stdio;
use std::io::{stdout, Write};

use clap::Parser;
use tokio::select;
use tokio_stream::StreamExt; // provides combinator methods like next on to of FramedRead buf read and Stream trait
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, Level};
use tracing_subscriber::fmt;

use relay_client::{connect, ClientError, ServerEvent};
use relay_protocol::ProtocolError;

const GREETINGS: &str = "$ Welcome to chat! \n$ Commands: \\quit, /users, /pm <user> <text>, /typing\n$ Please input chat name:";

/// Terminal client for the text relay
#[derive(Parser, Debug)]
#[command(name = "relay-client", version, about = "Terminal client for the text relay")]
struct Args {
    /// Relay address
    #[arg(long, env = "RELAY_SERVER", default_value = "127.0.0.1:12345")]
    server: String,

    /// Display name, prompted for when omitted
    #[arg(long, env = "RELAY_NAME")]
    name: Option<String>,

    /// Maximum log level
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "warn")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let args = Args::parse();

    fmt()
        .compact() // use abbreviated log format
        .with_max_level(args.log_level)
        .init();

    let name = match args.name {
        Some(name) => name,
        None => read_sync_user_input(GREETINGS)?,
    };

    info!("Client starting, connecting to server {:?}", &args.server);

    let (mut outgoing, mut incoming) = connect(&args.server, &name).await
        .map_err(|e| { error!("Unable to connect to server"); e })?;

    // Spawn client tcp read tokio task, to read back main server msgs
    let server_read_handle = tokio::spawn(async move {
        while let Some(value) = incoming.next_event().await {
            match value {
                Ok(ServerEvent::Line(line)) => println!("> {}", line),
                Ok(ServerEvent::Typing(who)) => println!("... {} is typing", who),
                Ok(ServerEvent::Notice(msg)) => println!(">>> {}", msg),
                Err(e) => {
                    debug!("Client Connection closing error: {:?}", e);
                    break;
                },
            }
        }
        info!("Server Remote has closed");
    });

    // Read lines from the command line and forward them to the server
    let cmd_line_handle = tokio::spawn(async move {
        // uncapped here, the encoder reports lines too long to send
        let mut fr = FramedRead::new(tokio::io::stdin(), LinesCodec::new());

        while let Some(value) = fr.next().await {
            let line = match value {
                Ok(line) => line,
                Err(e) => {
                    error!("Unable to read command line input: {}", e);
                    break;
                },
            };

            match line.trim() {
                "\\quit" => {
                    info!("Session terminated by user...");
                    break;
                },
                "" => continue,
                _ => (),
            }

            if let Err(e) = outgoing.submit(&line).await {
                match e {
                    ClientError::Protocol(e @ (ProtocolError::LineTooLong { .. } | ProtocolError::MalformedPrivate)) => {
                        println!(">>> {}", e)
                    },
                    e => {
                        error!("Unable to write to server: {}", e);
                        break;
                    },
                }
            }
        }

        let _ = outgoing.close().await;
    });

    select! {
        _ = server_read_handle => {},
        _ = cmd_line_handle => {},
    }

    Ok(())
}

// blocking function to gather user input from std::io::stdin
fn read_sync_user_input(prompt: &str) -> stdio::Result<String> {
    let mut buf = String::new();

    print!("{} ", prompt);
    stdout().flush()?; // Since stdout is line buffered need to explicitly flush
    stdio::stdin().read_line(&mut buf)?;

    Ok(buf.trim().to_owned())
}

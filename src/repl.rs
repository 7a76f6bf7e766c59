use futures::StreamExt;
use log::{info, warn};
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::Editor;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::sandbox::{Command, Sandbox};

// rustyline blocks, so lines are read on a plain thread and forwarded to the async loop.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut rl = match Editor::<(), FileHistory>::new() {
            Ok(rl) => rl,
            Err(e) => {
                warn!("Failed to start line editor: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(">> ") {
                Ok(line) => {
                    if let Err(e) = rl.add_history_entry(line.as_str()) {
                        warn!("Failed to record history: {}", e);
                    }
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    warn!("Error reading input: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

/// Reads commands until `exit`, end of input or a shutdown signal.
pub async fn run(sandbox: &Sandbox, mut shutdown_rx: watch::Receiver<()>) {
    println!("Starting REPL. Type 'help' for commands.");
    println!("{}", sandbox.status());

    let mut lines = UnboundedReceiverStream::new(spawn_line_reader());

    loop {
        tokio::select! {
            line = lines.next() => {
                let Some(line) = line else {
                    println!("Exiting REPL.");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                match line.parse::<Command>() {
                    Ok(Command::Exit) => {
                        println!("Exiting REPL.");
                        break;
                    }
                    Ok(command) => println!("{}", sandbox.execute(command)),
                    Err(message) => println!("{}", message),
                }
            }
            _ = shutdown_rx.changed() => {
                info!("Shutdown signal received, leaving REPL");
                break;
            }
        }
    }
}

use log::{error, info};

use meet_sandbox::config::Config;
use meet_sandbox::sandbox::Sandbox;
use meet_sandbox::status::MEDIA_FAILURE_STATUS;
use meet_sandbox::{create_transport, logging, repl, MeetingError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env_variables()?;
    logging::setup_logging(config.log_file.as_deref())?;

    info!(
        "Joining room {} as {} ({}) over {} transport",
        config.relay.room,
        config.relay.display_name,
        config.relay.participant_id,
        config.transport_kind
    );

    let transport = create_transport(config.transport_kind, &config.relay)?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());
    ctrlc::set_handler(move || {
        info!("Received Ctrl-C signal. Shutting down...");
        let _ = shutdown_tx.send(());
    })?;

    println!("Requesting camera + microphone…");

    // Dropping the launch future on Ctrl-C cancels an in-flight transport start.
    let sandbox = tokio::select! {
        result = Sandbox::launch(&config, transport) => match result {
            Ok(sandbox) => sandbox,
            Err(MeetingError::MediaAcquisition(reason)) => {
                error!("Local media unavailable: {}", reason);
                println!("{}", MEDIA_FAILURE_STATUS);
                return Ok(());
            }
            Err(err) => {
                println!("Failed to join the meeting: {}", err);
                return Err(err.into());
            }
        },
        _ = shutdown_rx.changed() => {
            info!("Shutdown requested before the transport finished starting");
            return Ok(());
        }
    };

    repl::run(&sandbox, shutdown_rx).await;
    sandbox.shutdown().await;

    Ok(())
}

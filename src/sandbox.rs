//! Wires local media, the meeting state and a transport into one session.

use log::{error, info, warn};
use prettytable::{row, Table};
use std::str::FromStr;

use crate::config::Config;
use crate::controls::{toggle_local_mute, toggle_remote_speaking};
use crate::errors::{MeetingError, MeetingResult};
use crate::media::{acquire_local_media, MediaStream};
use crate::meeting_state::MeetingState;
use crate::model::{Participant, ParticipantKind, LOCAL_PARTICIPANT_ID};
use crate::roster::ParticipantRoster;
use crate::status::{describe_participant, room_status};
use crate::transport::{Transport, TransportHandle, TransportKind, TransportOptions};

pub const HELP: &str =
    "Available commands: help, status, list, mute, speak, add, remove [id], exit";

const NO_SYNTHETIC_CONTROLS: &str = "This transport cannot fabricate remote participants.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    List,
    Mute,
    Speak,
    Add,
    Remove(Option<String>),
    Exit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let command = match command {
            "help" => Command::Help,
            "status" => Command::Status,
            "list" => Command::List,
            "mute" => Command::Mute,
            "speak" => Command::Speak,
            "add" => Command::Add,
            "remove" => Command::Remove(parts.next().map(str::to_string)),
            "exit" | "quit" => Command::Exit,
            _ => return Err(format!("Unknown command: {}", line.trim())),
        };

        if parts.next().is_some() {
            return Err(format!("Too many arguments. {}", HELP));
        }
        Ok(command)
    }
}

pub struct Sandbox {
    state: MeetingState,
    transport: Box<dyn Transport>,
    transport_kind: TransportKind,
    handle: Option<Box<dyn TransportHandle>>,
    roster: ParticipantRoster,
    local_stream: MediaStream,
}

impl Sandbox {
    /// Acquires local media, registers the local participant and starts `transport`.
    ///
    /// On failure everything acquired so far is released before the error is returned.
    pub async fn launch(config: &Config, transport: Box<dyn Transport>) -> MeetingResult<Self> {
        let state = MeetingState::new();
        let roster = ParticipantRoster::attach(&state);

        let local_stream = match acquire_local_media(config.capture) {
            Ok(stream) => stream,
            Err(err) => {
                error!("Unable to acquire local media: {}", err);
                roster.detach();
                return Err(err);
            }
        };

        let local = Participant::local(config.relay.display_name.clone(), local_stream.clone());
        let local = match state.add_participant(local) {
            Ok(local) => local,
            Err(err) => {
                local_stream.stop_all();
                roster.detach();
                return Err(err);
            }
        };

        info!("Starting {} transport", config.transport_kind);
        let handle = match transport
            .start(TransportOptions {
                state: state.clone(),
                local_participant: local,
            })
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                error!("Unable to start {} transport: {}", config.transport_kind, err);
                state.remove_participant(LOCAL_PARTICIPANT_ID);
                local_stream.stop_all();
                roster.detach();
                return Err(err);
            }
        };

        Ok(Sandbox {
            state,
            transport,
            transport_kind: config.transport_kind,
            handle: Some(handle),
            roster,
            local_stream,
        })
    }

    pub fn state(&self) -> &MeetingState {
        &self.state
    }

    pub fn roster(&self) -> &ParticipantRoster {
        &self.roster
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    pub fn has_synthetic_controls(&self) -> bool {
        self.transport.synthetic_controls().is_some()
    }

    pub fn status(&self) -> String {
        room_status(&self.state)
    }

    /// Runs one user action and returns the text to show for it.
    pub fn execute(&self, command: Command) -> String {
        match command {
            Command::Help => HELP.to_string(),
            Command::Status => self.status(),
            Command::List => self.render_participants(),
            Command::Mute => match toggle_local_mute(&self.state) {
                Ok(Some(local)) if local.muted => "Microphone muted.".to_string(),
                Ok(Some(_)) => "Microphone live.".to_string(),
                Ok(None) => "No local participant.".to_string(),
                Err(err) => self.report(err),
            },
            Command::Speak => {
                if !self.has_synthetic_controls() {
                    return NO_SYNTHETIC_CONTROLS.to_string();
                }
                match toggle_remote_speaking(&self.state) {
                    Ok(Some(remote)) => format!(
                        "{} is now {}.",
                        remote.name,
                        describe_participant(&remote).to_lowercase()
                    ),
                    Ok(None) => "No remote participants.".to_string(),
                    Err(err) => self.report(err),
                }
            }
            Command::Add => match self.transport.synthetic_controls() {
                Some(controls) => match controls.add_remote_participant() {
                    Ok(remote) => format!("Added {} ({}).", remote.name, remote.id),
                    Err(err) => self.report(err),
                },
                None => NO_SYNTHETIC_CONTROLS.to_string(),
            },
            Command::Remove(id) => match self.transport.synthetic_controls() {
                Some(controls) => match controls.remove_remote_participant(id.as_deref()) {
                    Some(remote) => format!("Removed {} ({}).", remote.name, remote.id),
                    None => "No matching synthetic participant.".to_string(),
                },
                None => NO_SYNTHETIC_CONTROLS.to_string(),
            },
            Command::Exit => "Bye.".to_string(),
        }
    }

    fn report(&self, err: MeetingError) -> String {
        warn!("Command failed: {}", err);
        format!("Error: {}", err)
    }

    fn render_participants(&self) -> String {
        let mut table = Table::new();
        table.add_row(row!["Id", "Name", "Kind", "Status", "Tracks"]);

        for participant in self.roster.participants() {
            let kind = match participant.kind {
                ParticipantKind::Local => "local",
                ParticipantKind::Remote => "remote",
            };
            let tracks = participant.stream.tracks().len();
            table.add_row(row![
                participant.id,
                participant.name,
                kind,
                describe_participant(&participant),
                tracks.to_string(),
            ]);
        }

        table.to_string()
    }

    /// Stops the transport, removes the local participant and releases its tracks.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().await;
        }

        self.state.remove_participant(LOCAL_PARTICIPANT_ID);
        self.local_stream.stop_all();
        self.roster.detach();
        info!("Sandbox shut down");
    }
}

use courier_common::{Direction, ServiceStatus};
use std::fmt;
use thiserror::Error;

/// Startup step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    SenderSettings,
    SenderStart,
    ListenerSettings,
    ListenerStart,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupStage::SenderSettings => write!(f, "sender settings validation"),
            StartupStage::SenderStart => write!(f, "sender start"),
            StartupStage::ListenerSettings => write!(f, "listener settings validation"),
            StartupStage::ListenerStart => write!(f, "listener start"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CommsError {
    #[error("Channel id is not set")]
    ChannelIdUndefined,

    #[error("Agent startup failed for channel '{channel_id}' during {stage}: {source}")]
    Startup {
        channel_id: String,
        stage: StartupStage,
        #[source]
        source: Box<CommsError>,
    },

    #[error("No {direction} partitions configured for channel '{channel_id}'")]
    PartitionsUndefined {
        channel_id: String,
        direction: Direction,
    },

    #[error("Duplicate {direction} priority {priority} for channel '{channel_id}'")]
    DuplicatePriority {
        channel_id: String,
        direction: Direction,
        priority: i32,
    },

    #[error("Cannot {operation} while {status}")]
    InvalidState {
        operation: &'static str,
        status: ServiceStatus,
    },

    #[error("{}", clients_undefined_message(.channel_id, .priority))]
    ClientsUndefined {
        channel_id: String,
        priority: Option<i32>,
    },

    #[error("Transport error on {client}: {message}")]
    Transport {
        client: String,
        message: String,
    },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

fn clients_undefined_message(channel_id: &str, priority: &Option<i32>) -> String {
    match priority {
        None => format!("No sender clients are defined for channel '{}'", channel_id),
        Some(p) => format!(
            "No sender client for channel '{}' at priority {} and no default priority",
            channel_id, p
        ),
    }
}

impl CommsError {
    pub(crate) fn startup(channel_id: &str, stage: StartupStage, source: CommsError) -> Self {
        CommsError::Startup {
            channel_id: channel_id.to_string(),
            stage,
            source: Box::new(source),
        }
    }

    pub fn transport(client: impl Into<String>, message: impl Into<String>) -> Self {
        CommsError::Transport {
            client: client.into(),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the fatal startup family.
    pub fn is_startup(&self) -> bool {
        matches!(self, CommsError::Startup { .. } | CommsError::ChannelIdUndefined)
    }

    /// The innermost error beneath any startup wrapping.
    pub fn root_cause(&self) -> &CommsError {
        match self {
            CommsError::Startup { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

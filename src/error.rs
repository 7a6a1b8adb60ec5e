use crate::bridge::BridgeState;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A producer or consumer device (or the swap chain) could not be created.
    #[error("failed to create graphics device: {0}")]
    DeviceCreation(String),

    /// The shared texture, its export handle, or one of its views could not
    /// be created. Always fatal to the session.
    #[error("shared surface allocation failed: {0}")]
    Allocation(String),

    /// The engine asked for an output configuration this bridge cannot serve.
    /// The engine may retry with different parameters.
    #[error("output negotiation rejected: {0}")]
    NegotiationRejected(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("callback `{callback}` is not valid in bridge state {state:?}")]
    InvalidState {
        callback: &'static str,
        state: BridgeState,
    },

    #[error("no available backend implementation: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeErrorClass {
    InvalidInput,
    Recoverable,
    Fatal,
}

impl BridgeError {
    pub fn class(&self) -> BridgeErrorClass {
        match self {
            Self::NegotiationRejected(_) => BridgeErrorClass::Recoverable,
            Self::InvalidState { .. } => BridgeErrorClass::InvalidInput,
            Self::DeviceCreation(_)
            | Self::Allocation(_)
            | Self::ShaderCompile(_)
            | Self::BackendUnavailable(_)
            | Self::Platform(_) => BridgeErrorClass::Fatal,
        }
    }

    /// Fatal errors end the session: every resource is released and no
    /// degraded rendering mode exists.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), BridgeErrorClass::Fatal)
    }

    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    pub(crate) fn device(err: anyhow::Error) -> Self {
        Self::DeviceCreation(format!("{err:#}"))
    }

    pub(crate) fn allocation(err: anyhow::Error) -> Self {
        Self::Allocation(format!("{err:#}"))
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("event handler must be a function")]
    MissingEventHandler,
    #[error("upload manager has been destroyed")]
    Destroyed,
}

impl ManagerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingEventHandler => "UPL-1001",
            Self::Destroyed => "UPL-1002",
        }
    }
}

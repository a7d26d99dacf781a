use cadenza_abr::AbrError;
use cadenza_alloc::AllocError;
use cadenza_loader::LoaderError;
use cadenza_net::NetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is shut down")]
    ShutDown,
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Abr(#[from] AbrError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

pub type SessionResult<T> = Result<T, SessionError>;
